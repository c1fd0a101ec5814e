//! Tokenizer/parser for the textual volume specification (§6 "Volume spec
//! textual format"): `#`-comments, whitespace-insignificant `volume ...
//! end-volume` blocks.

use crate::types::errors::{FuseResult, PosixError};

/// One `volume ... end-volume` block, before subvolume references are
/// resolved into actual translator instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedVolume {
    pub name: String,
    pub type_name: String,
    pub options: Vec<(String, String)>,
    pub subvolumes: Vec<String>,
}

fn syntax_error(msg: impl Into<String>) -> PosixError {
    PosixError::new(libc::EINVAL, msg.into())
}

/// Parses `text` into a flat, declaration-ordered list of volumes. Does not
/// resolve `subvolumes` references or validate uniqueness — that is
/// [`super::build_graph`]'s job.
pub fn parse_spec(text: &str) -> FuseResult<Vec<ParsedVolume>> {
    let tokens: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .flat_map(str::split_whitespace)
        .collect();

    let mut iter = tokens.into_iter().peekable();
    let mut volumes = Vec::new();

    while let Some(tok) = iter.next() {
        if tok != "volume" {
            return Err(syntax_error(format!("expected 'volume', found '{tok}'")));
        }
        let name = iter.next().ok_or_else(|| syntax_error("expected volume name"))?.to_string();
        let mut type_name = None;
        let mut options = Vec::new();
        let mut subvolumes = Vec::new();

        loop {
            let kw = iter.next().ok_or_else(|| syntax_error(format!("unterminated volume '{name}'")))?;
            match kw {
                "type" => {
                    type_name = Some(iter.next().ok_or_else(|| syntax_error("expected type name"))?.to_string());
                }
                "option" => {
                    let key = iter.next().ok_or_else(|| syntax_error("expected option key"))?.to_string();
                    let value = iter.next().ok_or_else(|| syntax_error("expected option value"))?.to_string();
                    options.push((key, value));
                }
                "subvolumes" => {
                    while let Some(&peek) = iter.peek() {
                        if peek == "end-volume" {
                            break;
                        }
                        subvolumes.push(iter.next().unwrap().to_string());
                    }
                }
                "end-volume" => break,
                other => return Err(syntax_error(format!("unexpected token '{other}' in volume '{name}'"))),
            }
        }

        let type_name = type_name.ok_or_else(|| syntax_error(format!("volume '{name}' has no 'type'")))?;
        volumes.push(ParsedVolume {
            name,
            type_name,
            options,
            subvolumes,
        });
    }

    Ok(volumes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_single_leaf_volume() {
        let spec = "volume leaf\n  type storage/kv\n  option directory /tmp/exp\nend-volume\n";
        let volumes = parse_spec(spec).unwrap();
        assert_eq!(volumes.len(), 1);
        assert_eq!(volumes[0].name, "leaf");
        assert_eq!(volumes[0].type_name, "storage/kv");
        assert_eq!(volumes[0].options, vec![("directory".to_string(), "/tmp/exp".to_string())]);
    }

    #[test]
    fn parses_subvolumes_and_comments() {
        let spec = "# a leaf\nvolume leaf\n  type storage/kv\n  option directory /tmp/exp\nend-volume\n\nvolume fuse\n  type mount/fuse\n  option mount-point /mnt/x\n  subvolumes leaf\nend-volume\n";
        let volumes = parse_spec(spec).unwrap();
        assert_eq!(volumes.len(), 2);
        assert_eq!(volumes[1].subvolumes, vec!["leaf".to_string()]);
    }

    #[test]
    fn missing_type_is_a_syntax_error() {
        let spec = "volume leaf\n  option directory /tmp/exp\nend-volume\n";
        assert!(parse_spec(spec).is_err());
    }

    #[test]
    fn whitespace_between_tokens_is_insignificant() {
        let spec = "volume   leaf type storage/kv option directory /tmp/exp end-volume";
        let volumes = parse_spec(spec).unwrap();
        assert_eq!(volumes[0].name, "leaf");
    }
}
