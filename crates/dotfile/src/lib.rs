use std::fs;
use std::path::Path;

use serde::Deserialize;

const DOTFILE_NAME: &str = ".vesper";

/// Project settings read from a `.vesper` file.
#[derive(Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Dotfile {
    #[serde(default)]
    pub compiler: CompilerConfig,
}

impl Dotfile {
    /// Reads the dotfile in the given directory, or returns the defaults when there is none.
    pub fn load_or_default(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        match fs::read_to_string(path.as_ref().join(DOTFILE_NAME)) {
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
            Ok(content) => Self::parse(&content),
        }
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerConfig {
    pub receiver_rewrite: bool,
    pub exhaustive_fit_testing: bool,
    pub warnings_as_errors: bool,
    pub allow_short_circuit: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            receiver_rewrite: true,
            exhaustive_fit_testing: true,
            warnings_as_errors: false,
            allow_short_circuit: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_compiler_section() {
        let content = r#"
            [compiler]
            receiver_rewrite = false
            warnings_as_errors = true
        "#;

        let dotfile = Dotfile::parse(content).unwrap();
        assert_eq!(
            dotfile,
            Dotfile {
                compiler: CompilerConfig {
                    receiver_rewrite: false,
                    warnings_as_errors: true,
                    ..Default::default()
                }
            }
        );
    }

    #[test]
    fn empty_dotfile_uses_defaults() {
        let dotfile = Dotfile::parse("").unwrap();
        assert!(dotfile.compiler.receiver_rewrite);
        assert!(dotfile.compiler.exhaustive_fit_testing);
        assert!(!dotfile.compiler.warnings_as_errors);
        assert!(!dotfile.compiler.allow_short_circuit);
    }

    #[test]
    fn reject_unknown_fields() {
        let content = r#"
            [compiler]
            receiver_rewrites = false
        "#;
        let err = Dotfile::parse(content).unwrap_err();
        assert!(err.to_string().contains("receiver_rewrites"), "{err}");

        assert!(Dotfile::parse("source_roots = [\"src\"]").is_err());
    }

    #[test]
    fn missing_dotfile_is_default() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("no-such-directory");
        assert_eq!(Dotfile::load_or_default(dir).unwrap(), Dotfile::default());
    }
}
