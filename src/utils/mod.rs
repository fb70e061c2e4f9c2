pub mod db_utils;
pub mod double_option;
pub mod email_cache;
pub mod email_filter;
pub mod pagination;
pub mod validation;
