//! Format registry (spec §4.4, component C4).
//!
//! Each recognized payload format declares its magic bytes, plausible size
//! bounds, output location, and a header parser that turns a raw signature
//! hit into an accept/reject decision plus a size estimate. Magic bytes
//! alone produce false positives (a GPU debug token, a coincidental byte
//! run); the second validation pass keyed on format-specific invariants is
//! what the carver actually trusts.

pub mod builtin;

use std::collections::HashMap;

/// Stable identifier for a format, used in carve manifests and format
/// allow-lists.
pub type FormatId = &'static str;

/// One magic-byte signature belonging to a format. A format may register
/// several (e.g. a format with both a "plain" and "commented" header).
pub struct Signature {
    pub id: u32,
    pub magic: &'static [u8],
    pub description: &'static str,
}

/// What a format's header parser concluded about a signature-scan hit.
pub struct ParseResult {
    /// Total size of the file, measured from its true start (which may
    /// precede the signature offset by `leading_bytes`).
    pub size_estimate: u64,
    /// Number of bytes before the signature offset that belong to the file
    /// (spec §4.5 step 5a: some formats tolerate a comment prefix).
    pub leading_bytes: u64,
    pub output_folder_override: Option<&'static str>,
    pub extension_override: Option<&'static str>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ParseResult {
    pub fn new(size_estimate: u64) -> Self {
        ParseResult {
            size_estimate,
            leading_bytes: 0,
            output_folder_override: None,
            extension_override: None,
            metadata: HashMap::new(),
        }
    }

    pub fn with_leading_bytes(mut self, leading_bytes: u64) -> Self {
        self.leading_bytes = leading_bytes;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// How much context a format's parser needs around a signature hit.
/// Spec §4.4: "±512 bytes (or up to 64 KiB, 512 KiB for specific formats
/// needing boundary scanning)".
#[derive(Debug, Clone, Copy)]
pub struct ContextWindow {
    pub before: usize,
    pub after: usize,
}

impl Default for ContextWindow {
    fn default() -> Self {
        ContextWindow { before: 512, after: 512 }
    }
}

/// A recognized embedded-file format.
pub trait FormatHandler: Send + Sync {
    fn id(&self) -> FormatId;
    fn display_name(&self) -> &'static str;
    fn output_folder(&self) -> &'static str;
    fn default_extension(&self) -> &'static str;
    fn min_size(&self) -> u64;
    fn max_size(&self) -> u64;

    /// Whether this format is discovered via magic-byte scanning at all;
    /// some formats (module images) are found purely by walking dump
    /// metadata (spec §4.4).
    fn scanning_enabled(&self) -> bool {
        true
    }

    fn signatures(&self) -> &[Signature];

    fn context_window(&self) -> ContextWindow {
        ContextWindow::default()
    }

    /// Validates a signature-scan hit. `window` is the context around the
    /// hit (see [`context_window`](FormatHandler::context_window)) and
    /// `signature_offset` is the position of the matched magic bytes
    /// within `window`. Returns `None` to reject.
    fn parse(&self, window: &[u8], signature_offset: usize, signature: &Signature) -> Option<ParseResult>;
}

/// The set of formats a carver run considers, in registration order (which
/// fixes pattern-id assignment order for determinism, spec §4.5).
pub struct FormatRegistry {
    formats: Vec<Box<dyn FormatHandler>>,
}

impl FormatRegistry {
    pub fn new() -> Self {
        FormatRegistry { formats: Vec::new() }
    }

    /// The default registry: every built-in format (spec §6 examples: DDS,
    /// PNG, XMA, plus module images discovered via metadata only).
    pub fn with_builtin_formats() -> Self {
        let mut reg = FormatRegistry::new();
        reg.register(Box::new(builtin::Dds));
        reg.register(Box::new(builtin::Png));
        reg.register(Box::new(builtin::Xma));
        reg.register(Box::new(builtin::ModuleImage));
        reg
    }

    pub fn register(&mut self, format: Box<dyn FormatHandler>) {
        self.formats.push(format);
    }

    pub fn formats(&self) -> &[Box<dyn FormatHandler>] {
        &self.formats
    }

    pub fn find(&self, id: FormatId) -> Option<&dyn FormatHandler> {
        self.formats.iter().find(|f| f.id() == id).map(|b| b.as_ref())
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        Self::with_builtin_formats()
    }
}
