use serde::{Deserialize, Serialize};

/// A failure message attached to a `Failed` job.
///
/// `errcode` is a short machine-readable code, `field` optionally names the
/// input field at fault and `vals` carries free-form detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub errcode: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vals: Vec<String>,
}

impl ErrorMessage {
    pub const INIT_FAILED: &'static str = "init_failed";
    pub const PROCESSOR_NOT_FOUND: &'static str = "processor_not_found";
    pub const PROCESSOR_FAILED: &'static str = "processor_failed";
    pub const PROCESSOR_PANICKED: &'static str = "processor_panicked";
    pub const BLOCK_TYPE_MISMATCH: &'static str = "block_type_mismatch";

    pub fn new(errcode: impl Into<String>) -> Self {
        Self {
            errcode: errcode.into(),
            field: None,
            vals: Vec::new(),
        }
    }

    /// Shorthand for a message with one detail value.
    pub fn with_detail(errcode: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(errcode).with_val(detail)
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_val(mut self, val: impl Into<String>) -> Self {
        self.vals.push(val.into());
        self
    }
}
