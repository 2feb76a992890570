use serde::de::DeserializeOwned;
use thiserror::Error;

/// Deserialization failure with the JSON path it happened at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("at JSON path {path} → {message}")]
pub struct PathError {
    pub path: String,
    pub message: String,
}

/// Deserialize with JSON-path context in error messages.
pub fn from_str_with_path<T: DeserializeOwned>(src: &str) -> Result<T, PathError> {
    let de = &mut serde_json::Deserializer::from_str(src);
    serde_path_to_error::deserialize::<_, T>(de).map_err(into_path_error)
}

/// Same as [`from_str_with_path`] for an already parsed document.
pub fn from_value_with_path<T: DeserializeOwned>(value: serde_json::Value) -> Result<T, PathError> {
    serde_path_to_error::deserialize::<_, T>(value).map_err(into_path_error)
}

fn into_path_error(err: serde_path_to_error::Error<serde_json::Error>) -> PathError {
    PathError {
        path: err.path().to_string(),
        message: err.into_inner().to_string(),
    }
}
