use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use docx_template::{MissingKey, RenderOptions};

/// Configuration for the docx-template renderer.
#[derive(Parser, Debug, Clone)]
#[command(name = "docx-template")]
#[command(about = "Render a .docx template with JSON data")]
pub struct Config {
    /// Template document to render
    #[arg(long, env = "DOCX_TEMPLATE")]
    pub template: PathBuf,

    /// JSON file holding the data object, or `-` for stdin
    #[arg(long, default_value = "-", env = "DOCX_TEMPLATE_DATA")]
    pub data: String,

    /// Where to write the rendered document
    #[arg(long, short, env = "DOCX_TEMPLATE_OUTPUT")]
    pub output: PathBuf,

    /// Time limit for table range normalization, in milliseconds
    #[arg(long, default_value = "500", env = "DOCX_TEMPLATE_RANGE_TIMEOUT_MS")]
    pub range_timeout_ms: u64,

    /// Fail when a template field names a key the data does not have
    #[arg(long, env = "DOCX_TEMPLATE_STRICT")]
    pub strict: bool,
}

impl Config {
    pub fn render_options(&self) -> RenderOptions {
        RenderOptions {
            range_timeout: Duration::from_millis(self.range_timeout_ms),
            missing_key: if self.strict {
                MissingKey::Error
            } else {
                MissingKey::Empty
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_defaults() {
        let config =
            Config::try_parse_from(["docx-template", "--template", "in.docx", "-o", "out.docx"])
                .unwrap();
        assert_eq!(config.data, "-");
        assert_eq!(config.render_options(), RenderOptions::default());
    }

    #[test]
    fn test_strict_and_timeout() {
        let config = Config::try_parse_from([
            "docx-template",
            "--template",
            "in.docx",
            "--output",
            "out.docx",
            "--range-timeout-ms",
            "50",
            "--strict",
        ])
        .unwrap();
        let options = config.render_options();
        assert_eq!(options.range_timeout, Duration::from_millis(50));
        assert_eq!(options.missing_key, MissingKey::Error);
    }
}
