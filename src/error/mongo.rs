use std::fmt;

use super::kinds::WriteError;

/// Structured error information extracted from MongoDB errors.
///
/// Condensed into one line for collection reports and error output.
#[derive(Debug, Default, Clone)]
pub struct ErrorInfo {
    pub(crate) error_type: Option<String>,
    pub(crate) code: Option<i32>,
    pub(crate) name: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) details: Option<ErrorDetails>,
}

/// Additional error details extracted from the server's error document.
#[derive(Debug, Clone)]
pub struct ErrorDetails {
    pub(crate) index: Option<String>,
    pub(crate) key: Option<bson::Document>,
}

impl ErrorInfo {
    /// One-line summary suitable for a collection report.
    ///
    /// `DuplicateKey (11000): Duplicate key error [key: { "_id": 1 }]`
    pub fn summary(&self) -> String {
        let mut out = String::new();
        match (&self.name, self.code) {
            (Some(name), Some(code)) => out.push_str(&format!("{name} ({code}): ")),
            (None, Some(code)) => out.push_str(&format!("code {code}: ")),
            _ => {}
        }
        out.push_str(self.message.as_deref().unwrap_or("unknown error"));

        if let Some(details) = &self.details {
            if let Some(key) = &details.key {
                out.push_str(&format!(" [key: {key}]"));
            } else if let Some(index) = &details.index {
                out.push_str(&format!(" [index: {index}]"));
            }
        }
        out
    }
}

/// Format MongoDB errors as a one-line summary.
///
/// Used by the parent module's `Display` implementation for
/// `DocshiftError::MongoDb`.
pub fn format_mongodb_error(
    f: &mut fmt::Formatter<'_>,
    error: &mongodb::error::Error,
) -> fmt::Result {
    write!(f, "{}", extract_error_info(error).summary())
}

/// Convert a failed `insert_many` into a [`WriteError`].
///
/// Inserts are ordered, so the index of the first failing document equals
/// the number of documents the server accepted before stopping. Without a
/// per-document write error (write concern failures, dropped connections)
/// the server may have written any prefix of the batch, so the count is
/// left unknown.
pub fn write_error_from_insert(collection: &str, error: &mongodb::error::Error) -> WriteError {
    WriteError {
        collection: collection.to_string(),
        inserted: first_failed_index(error),
        message: extract_error_info(error).summary(),
    }
}

/// Smallest `write_errors[].index` of an `insert_many` failure.
fn first_failed_index(error: &mongodb::error::Error) -> Option<u64> {
    use mongodb::error::ErrorKind;

    match error.kind.as_ref() {
        ErrorKind::InsertMany(insert_error) => insert_error
            .write_errors
            .as_ref()
            .and_then(|errors| errors.iter().map(|e| e.index).min())
            .map(|index| index as u64),
        _ => None,
    }
}

/// Extract structured information from a MongoDB error using the driver API.
pub fn extract_error_info(error: &mongodb::error::Error) -> ErrorInfo {
    use mongodb::error::{ErrorKind, WriteFailure};

    let mut info = ErrorInfo::default();

    match error.kind.as_ref() {
        ErrorKind::Write(write_failure) => {
            info.error_type = Some("mongo.write_error".to_string());

            match write_failure {
                WriteFailure::WriteError(write_error) => {
                    info.code = Some(write_error.code);
                    info.message = Some(write_error.message.clone());
                    info.name = get_error_name(write_error.code);
                    info.details = Some(extract_details(&write_error.details));
                }
                WriteFailure::WriteConcernError(wc_error) => {
                    info.code = Some(wc_error.code);
                    info.message = Some(wc_error.message.clone());
                    info.name = get_error_name(wc_error.code);
                }
                _ => {}
            }
        }
        ErrorKind::Command(command_error) => {
            info.error_type = Some("mongo.command_error".to_string());
            info.code = Some(command_error.code);
            info.message = Some(command_error.message.clone());
            info.name = get_error_name(command_error.code);
        }
        ErrorKind::InsertMany(insert_error) => {
            info.error_type = Some("mongo.insert_many_error".to_string());

            if let Some(write_errors) = &insert_error.write_errors {
                if let Some(first_error) = write_errors.first() {
                    info.code = Some(first_error.code);
                    info.message = Some(first_error.message.clone());
                    info.name = get_error_name(first_error.code);
                    info.details = Some(extract_details(&first_error.details));
                }
                if write_errors.len() > 1 {
                    let extra = write_errors.len() - 1;
                    info.message = info
                        .message
                        .map(|m| format!("{m} (+{extra} more write errors)"));
                }
            } else if let Some(wc_error) = &insert_error.write_concern_error {
                info.code = Some(wc_error.code);
                info.message = Some(wc_error.message.clone());
                info.name = get_error_name(wc_error.code);
            }
        }
        ErrorKind::Authentication { message, .. } => {
            info.error_type = Some("mongo.authentication_error".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::InvalidArgument { message, .. } => {
            info.error_type = Some("mongo.invalid_argument".to_string());
            info.message = Some(message.clone());
        }
        ErrorKind::ServerSelection { message, .. } => {
            info.error_type = Some("mongo.server_selection_error".to_string());
            info.message = Some(message.clone());
        }
        _ => {
            info.message = Some(error.to_string());
        }
    }

    info
}

/// Get a human-readable error name from a MongoDB error code.
fn get_error_name(code: i32) -> Option<String> {
    let name = match code {
        11000 | 11001 => "DuplicateKey",
        13 => "Unauthorized",
        18 => "AuthenticationFailed",
        26 => "NamespaceNotFound",
        50 => "MaxTimeMSExpired",
        121 => "DocumentValidationFailure",
        10334 => "BSONObjectTooLarge",
        _ => return None,
    };

    Some(name.to_string())
}

/// Pull the index name and the offending key out of a server error document.
fn extract_details(error_details: &Option<bson::Document>) -> ErrorDetails {
    let mut details = ErrorDetails {
        index: None,
        key: None,
    };

    if let Some(doc) = error_details {
        if let Some(bson::Bson::String(idx)) = doc.get("index") {
            details.index = Some(idx.clone());
        } else if let Some(bson::Bson::String(idx)) = doc.get("indexName") {
            details.index = Some(idx.clone());
        }

        // keyValue carries the colliding identity, keyPattern only the index shape
        if let Some(bson::Bson::Document(key_doc)) = doc.get("keyValue") {
            details.key = Some(key_doc.clone());
        } else if let Some(bson::Bson::Document(key_doc)) = doc.get("keyPattern") {
            details.key = Some(key_doc.clone());
        }
    }

    details
}
