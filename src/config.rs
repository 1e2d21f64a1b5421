//! Configuration types for block-tree-to-Markdown conversion.
//!
//! Every knob lives in [`ConversionConfig`], built via its
//! [`ConversionConfigBuilder`]. The renderer itself only reads
//! `use_html_tags`; the rest drive the retrieval pipeline and the output
//! layout.

use crate::error::Lark2MdError;
use crate::progress::ProgressCallback;
use std::fmt;

/// Configuration for a single conversion or a batch.
///
/// # Example
/// ```rust
/// use lark2md::ConversionConfig;
///
/// let config = ConversionConfig::builder()
///     .max_concurrency(8)
///     .requests_per_second(5)
///     .use_html_tags(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.image_dir, "static");
/// ```
#[derive(Clone)]
pub struct ConversionConfig {
    /// Emit `<strong>/<em>/<del>` instead of `**`, `_` and `~~`. Default: false.
    ///
    /// Table cells always use HTML tags regardless of this flag.
    pub use_html_tags: bool,

    /// Maximum number of documents processed at once in batch mode. Default: 5.
    pub max_concurrency: usize,

    /// Outbound request budget shared by every worker, in requests per
    /// second. Document fetches and asset fetches both count. Default: 5.
    ///
    /// The vendor API throttles at roughly five requests per second per app;
    /// going above that mostly produces 429s.
    pub requests_per_second: u32,

    /// Directory, relative to the Markdown file, that images are written to
    /// and linked from. Default: `"static"`.
    pub image_dir: String,

    /// Leave `![](token)` placeholders untouched and fetch no assets. Default: false.
    pub skip_image_download: bool,

    /// Name the output file after the document title instead of its id. Default: false.
    pub title_as_filename: bool,

    /// Run the Markdown formatter over the rendered output. Default: true.
    pub format_output: bool,

    /// Optional observer for batch and job events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            use_html_tags: false,
            max_concurrency: 5,
            requests_per_second: 5,
            image_dir: "static".to_string(),
            skip_image_download: false,
            title_as_filename: false,
            format_output: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ConversionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConversionConfig")
            .field("use_html_tags", &self.use_html_tags)
            .field("max_concurrency", &self.max_concurrency)
            .field("requests_per_second", &self.requests_per_second)
            .field("image_dir", &self.image_dir)
            .field("skip_image_download", &self.skip_image_download)
            .field("title_as_filename", &self.title_as_filename)
            .field("format_output", &self.format_output)
            .field(
                "progress_callback",
                &self
                    .progress_callback
                    .as_ref()
                    .map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl ConversionConfig {
    /// Create a new builder for `ConversionConfig`.
    pub fn builder() -> ConversionConfigBuilder {
        ConversionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ConversionConfig`].
#[derive(Debug)]
pub struct ConversionConfigBuilder {
    config: ConversionConfig,
}

impl ConversionConfigBuilder {
    pub fn use_html_tags(mut self, v: bool) -> Self {
        self.config.use_html_tags = v;
        self
    }

    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.config.max_concurrency = n.max(1);
        self
    }

    pub fn requests_per_second(mut self, rps: u32) -> Self {
        self.config.requests_per_second = rps.max(1);
        self
    }

    pub fn image_dir(mut self, dir: impl Into<String>) -> Self {
        self.config.image_dir = dir.into();
        self
    }

    pub fn skip_image_download(mut self, v: bool) -> Self {
        self.config.skip_image_download = v;
        self
    }

    pub fn title_as_filename(mut self, v: bool) -> Self {
        self.config.title_as_filename = v;
        self
    }

    pub fn format_output(mut self, v: bool) -> Self {
        self.config.format_output = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ConversionConfig, Lark2MdError> {
        let c = &self.config;
        if c.max_concurrency == 0 {
            return Err(Lark2MdError::InvalidConfig(
                "max_concurrency must be ≥ 1".into(),
            ));
        }
        if c.requests_per_second == 0 {
            return Err(Lark2MdError::InvalidConfig(
                "requests_per_second must be ≥ 1".into(),
            ));
        }
        let dir = c.image_dir.trim();
        if dir.is_empty() {
            return Err(Lark2MdError::InvalidConfig(
                "image_dir must not be empty".into(),
            ));
        }
        if std::path::Path::new(dir).is_absolute() || dir.split(['/', '\\']).any(|p| p == "..") {
            return Err(Lark2MdError::InvalidConfig(format!(
                "image_dir must be a relative path inside the output directory, got '{dir}'"
            )));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopProgressCallback;
    use std::sync::Arc;

    #[test]
    fn defaults_match_documented_values() {
        let c = ConversionConfig::default();
        assert!(!c.use_html_tags);
        assert_eq!(c.max_concurrency, 5);
        assert_eq!(c.requests_per_second, 5);
        assert_eq!(c.image_dir, "static");
        assert!(!c.skip_image_download);
        assert!(!c.title_as_filename);
        assert!(c.format_output);
        assert!(c.progress_callback.is_none());
    }

    #[test]
    fn builder_clamps_zero_limits() {
        let c = ConversionConfig::builder()
            .max_concurrency(0)
            .requests_per_second(0)
            .build()
            .unwrap();
        assert_eq!(c.max_concurrency, 1);
        assert_eq!(c.requests_per_second, 1);
    }

    #[test]
    fn builder_rejects_escaping_image_dir() {
        for dir in ["", "  ", "../images", "/abs/images", "a/../../b"] {
            let err = ConversionConfig::builder().image_dir(dir).build();
            assert!(
                matches!(err, Err(Lark2MdError::InvalidConfig(_))),
                "accepted {dir:?}"
            );
        }
        assert!(ConversionConfig::builder()
            .image_dir("assets/img")
            .build()
            .is_ok());
    }

    #[test]
    fn debug_hides_callback() {
        let c = ConversionConfig::builder()
            .progress_callback(Arc::new(NoopProgressCallback))
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("<dyn ConversionProgressCallback>"));
    }
}
