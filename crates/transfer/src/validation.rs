//! Pre-flight validation gate.
//!
//! Every check here is synchronous and side-effect free. A file that fails
//! never reaches the network.

use std::fmt;
use std::path::{Component, Path};

use mocup_protocol::ErrorCode;
use mocup_protocol::constants::{MAX_DIRECT_UPLOAD_SIZE, MAX_PRESIGNED_UPLOAD_SIZE, MIN_FILE_SIZE};
use serde::Serialize;

use crate::UploadFile;
use crate::progress::format_file_size;
use crate::sanitize::{SanitizeOptions, extract_extension, is_reserved_stem, sanitize_filename};

/// Characters never allowed in a filename.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Which transfer path a file takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadFlow {
    /// Single request through the API.
    Direct,
    /// Session + presigned PUT + completion.
    Presigned,
}

impl UploadFlow {
    /// Picks the flow from the file size alone.
    pub fn for_size(size: u64) -> Self {
        if size > MAX_DIRECT_UPLOAD_SIZE {
            Self::Presigned
        } else {
            Self::Direct
        }
    }
}

/// Why a file was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    FileTooSmall,
    FileTooLarge,
    InvalidFileType,
    BlockedExtension,
    InvalidFilename,
    SuspiciousFilename,
    TooManyFiles,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FileTooSmall => "FILE_TOO_SMALL",
            Self::FileTooLarge => "FILE_TOO_LARGE",
            Self::InvalidFileType => "INVALID_FILE_TYPE",
            Self::BlockedExtension => "BLOCKED_EXTENSION",
            Self::InvalidFilename => "INVALID_FILENAME",
            Self::SuspiciousFilename => "SUSPICIOUS_FILENAME",
            Self::TooManyFiles => "TOO_MANY_FILES",
        }
    }

    /// The API-level code this rejection is reported under.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::FileTooSmall => ErrorCode::FileTooSmall,
            Self::FileTooLarge => ErrorCode::FileTooLarge,
            Self::InvalidFileType => ErrorCode::InvalidMimeType,
            _ => ErrorCode::ValidationError,
        }
    }
}

impl fmt::Display for ValidationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single hard failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub message: String,
}

impl ValidationIssue {
    fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// Full validation outcome for one or more files.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub is_valid: bool,
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<String>,
    /// Storage-safe name proposed when the original raised warnings.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_name: Option<String>,
}

/// Single-file routing decision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDecision {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ValidationIssue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload_flow: Option<UploadFlow>,
}

/// One accepted MIME type and the extensions that may carry it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AllowedType {
    pub mime: String,
    pub extensions: Vec<String>,
}

impl AllowedType {
    pub fn new(mime: &str, extensions: &[&str]) -> Self {
        Self {
            mime: mime.to_string(),
            extensions: extensions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// Gate configuration.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    pub min_file_size: u64,
    /// Ceiling of the largest flow; anything bigger is rejected outright.
    pub max_file_size: u64,
    pub max_filename_length: usize,
    pub max_files: usize,
    /// Empty means any type is accepted.
    pub allowed_types: Vec<AllowedType>,
    pub blocked_extensions: Vec<String>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            min_file_size: MIN_FILE_SIZE,
            max_file_size: MAX_PRESIGNED_UPLOAD_SIZE,
            max_filename_length: 255,
            max_files: 10,
            allowed_types: default_allowed_types(),
            blocked_extensions: [
                "exe", "bat", "cmd", "com", "scr", "msi", "dll", "sh", "ps1", "vbs", "js", "jar",
                "app", "deb", "rpm", "apk",
            ]
            .iter()
            .map(|e| e.to_string())
            .collect(),
        }
    }
}

impl ValidationConfig {
    /// Instructions-only gate: PDFs and nothing else.
    pub fn pdf_only() -> Self {
        Self {
            allowed_types: vec![AllowedType::new("application/pdf", &["pdf"])],
            ..Self::default()
        }
    }

    fn is_blocked(&self, ext: &str) -> bool {
        self.blocked_extensions
            .iter()
            .any(|b| b.eq_ignore_ascii_case(ext))
    }

    fn type_for_extension(&self, ext: &str) -> Option<&AllowedType> {
        self.allowed_types
            .iter()
            .find(|t| t.extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
    }
}

fn default_allowed_types() -> Vec<AllowedType> {
    vec![
        AllowedType::new("application/pdf", &["pdf"]),
        AllowedType::new("image/jpeg", &["jpg", "jpeg"]),
        AllowedType::new("image/png", &["png"]),
        AllowedType::new("image/webp", &["webp"]),
        AllowedType::new("image/heic", &["heic"]),
        AllowedType::new("text/csv", &["csv"]),
        AllowedType::new("application/xml", &["xml", "lxf", "io"]),
        AllowedType::new("application/json", &["json"]),
        AllowedType::new("text/plain", &["txt"]),
    ]
}

/// MIME type conventionally carried by `ext`, from the default allow-list.
pub(crate) fn mime_for_extension(ext: &str) -> Option<&'static str> {
    Some(match ext {
        "pdf" => "application/pdf",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        "csv" => "text/csv",
        "xml" | "lxf" | "io" => "application/xml",
        "json" => "application/json",
        "txt" => "text/plain",
        _ => return None,
    })
}

/// Validates a single file.
pub fn validate_file(file: &UploadFile, config: &ValidationConfig) -> ValidationReport {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    check_size(file.size(), config, &mut errors);
    check_name(file.name(), config, &mut errors, &mut warnings);
    check_type(file, config, &mut errors, &mut warnings);

    let suggested_name = if warnings.is_empty() {
        None
    } else {
        let opts = SanitizeOptions {
            lowercase: false,
            max_length: config.max_filename_length,
        };
        let sanitized = sanitize_filename(file.name(), &opts);
        sanitized.was_modified.then_some(sanitized.sanitized)
    };

    ValidationReport {
        is_valid: errors.is_empty(),
        errors,
        warnings,
        suggested_name,
    }
}

/// Validates a list of files, adding a count check on top of the per-file
/// checks. Messages are prefixed with the offending file's name.
pub fn validate_files(files: &[UploadFile], config: &ValidationConfig) -> ValidationReport {
    let mut report = ValidationReport::default();

    if files.len() > config.max_files {
        report.errors.push(ValidationIssue::new(
            ValidationCode::TooManyFiles,
            format!(
                "Too many files: {} selected, at most {} allowed",
                files.len(),
                config.max_files
            ),
        ));
    }

    for file in files {
        let single = validate_file(file, config);
        report.errors.extend(single.errors.into_iter().map(|e| ValidationIssue {
            message: format!("{}: {}", file.name(), e.message),
            ..e
        }));
        report
            .warnings
            .extend(single.warnings.into_iter().map(|w| format!("{}: {w}", file.name())));
    }

    report.is_valid = report.errors.is_empty();
    report
}

/// Routing decision for one file: the first hard failure, or the flow to
/// use.
pub fn check_upload(file: &UploadFile, config: &ValidationConfig) -> FlowDecision {
    let report = validate_file(file, config);
    match report.errors.into_iter().next() {
        Some(error) => FlowDecision {
            valid: false,
            error: Some(error),
            upload_flow: None,
        },
        None => FlowDecision {
            valid: true,
            error: None,
            upload_flow: Some(UploadFlow::for_size(file.size())),
        },
    }
}

fn check_size(size: u64, config: &ValidationConfig, errors: &mut Vec<ValidationIssue>) {
    if size < config.min_file_size {
        errors.push(ValidationIssue::new(
            ValidationCode::FileTooSmall,
            "File is too small or corrupted.",
        ));
    } else if size > config.max_file_size {
        errors.push(ValidationIssue::new(
            ValidationCode::FileTooLarge,
            format!(
                "File is too large. Maximum size is {}.",
                format_file_size(config.max_file_size)
            ),
        ));
    }
}

fn check_name(
    name: &str,
    config: &ValidationConfig,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<String>,
) {
    if name.trim().is_empty() {
        errors.push(ValidationIssue::new(
            ValidationCode::InvalidFilename,
            "File name is empty.",
        ));
        return;
    }

    if name.chars().count() > config.max_filename_length {
        errors.push(ValidationIssue::new(
            ValidationCode::InvalidFilename,
            format!(
                "File name exceeds {} characters.",
                config.max_filename_length
            ),
        ));
    }

    if has_path_traversal(name) {
        errors.push(ValidationIssue::new(
            ValidationCode::SuspiciousFilename,
            "File name contains a path traversal sequence.",
        ));
    }

    if name.chars().any(|c| c.is_control() || FORBIDDEN_CHARS.contains(&c)) {
        errors.push(ValidationIssue::new(
            ValidationCode::InvalidFilename,
            "File name contains characters that are not allowed.",
        ));
    }

    let stem = name.split('.').next().unwrap_or_default();
    if is_reserved_stem(stem.trim_end()) {
        errors.push(ValidationIssue::new(
            ValidationCode::SuspiciousFilename,
            format!("'{stem}' is a reserved device name."),
        ));
    }

    if name.starts_with('.') || name.ends_with('.') || name.ends_with(' ') {
        errors.push(ValidationIssue::new(
            ValidationCode::SuspiciousFilename,
            "File name must not start or end with a dot or end with a space.",
        ));
    }

    // `report.pdf.exe` is caught by the blocked list; `setup.exe.pdf` is
    // only suspicious.
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() > 2 {
        let inner = &parts[1..parts.len() - 1];
        if inner.iter().any(|p| config.is_blocked(p)) {
            warnings.push("File name hides an executable extension.".to_string());
        }
    }

    if name.chars().any(|c| c == ' ' || (!c.is_alphanumeric() && !"-_.".contains(c))) {
        warnings.push("File name contains characters that will be replaced.".to_string());
    }
}

/// Traversal check on both separator styles.
fn has_path_traversal(name: &str) -> bool {
    let normalized = name.replace('\\', "/");
    Path::new(&normalized)
        .components()
        .any(|c| matches!(c, Component::ParentDir))
}

fn check_type(
    file: &UploadFile,
    config: &ValidationConfig,
    errors: &mut Vec<ValidationIssue>,
    warnings: &mut Vec<String>,
) {
    let ext = extract_extension(file.name());

    if let Some(ext) = ext.as_deref().filter(|e| config.is_blocked(e)) {
        errors.push(ValidationIssue::new(
            ValidationCode::BlockedExtension,
            format!("Files of type .{ext} are not allowed."),
        ));
        return;
    }

    if config.allowed_types.is_empty() {
        return;
    }

    let declared = file.content_type();
    let Some(allowed) = ext.as_deref().and_then(|e| config.type_for_extension(e)) else {
        errors.push(ValidationIssue::new(
            ValidationCode::InvalidFileType,
            match &ext {
                Some(e) => format!("Invalid file type. .{e} files are not accepted."),
                None => "Invalid file type. Files without an extension are not accepted."
                    .to_string(),
            },
        ));
        return;
    };

    if declared.is_empty() {
        warnings.push(format!(
            "No declared content type; {} will be assumed.",
            allowed.mime
        ));
    } else if !declared.eq_ignore_ascii_case(&allowed.mime) {
        warnings.push(format!(
            "Declared type {declared} does not match the .{} extension (expected {}).",
            ext.as_deref().unwrap_or_default(),
            allowed.mime
        ));
    }
}
