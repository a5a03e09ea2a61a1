use crate::server::response::ApiError;

const MAX_SEGMENT_LEN: usize = 255;

fn validate_segment(value: &str, entity: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{entity} cannot be empty"));
    }
    if value.len() > MAX_SEGMENT_LEN {
        return Err(format!("{entity} cannot exceed {MAX_SEGMENT_LEN} characters"));
    }
    if value.contains('/') || value.contains('\\') {
        return Err(format!("{entity} cannot contain path separators"));
    }
    if value.contains("..") {
        return Err(format!("{entity} cannot contain '..'"));
    }
    if value.chars().any(char::is_control) {
        return Err(format!("{entity} cannot contain control characters"));
    }
    Ok(())
}

pub fn validate_namespace(value: &str) -> Result<(), ApiError> {
    validate_segment(value, "Namespace").map_err(ApiError::bad_request)
}

pub fn validate_chart_name(value: &str) -> Result<(), ApiError> {
    validate_segment(value, "Chart name").map_err(ApiError::bad_request)
}

pub fn validate_chart_version(value: &str) -> Result<(), ApiError> {
    validate_segment(value, "Chart version").map_err(ApiError::bad_request)
}

pub fn validate_filename(value: &str) -> Result<(), ApiError> {
    validate_segment(value, "File name").map_err(ApiError::bad_request)
}
