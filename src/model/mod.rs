pub mod announcement;
pub mod attendance;
pub mod checklist;
pub mod instagram;
pub mod leave_request;
pub mod role;
pub mod story;
pub mod task;
pub mod user;
