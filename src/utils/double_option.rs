//! `#[serde(default, with = "crate::utils::double_option")]` keeps an
//! explicit `null` (`Some(None)`) apart from an absent field (`None`).

use serde::{Deserialize, Deserializer};

pub fn deserialize<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}
