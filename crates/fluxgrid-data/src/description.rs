//! Text scenario loader.
//!
//! A description file holds, line by line:
//!
//! ```text
//! 0.1            gravity
//! 3              number of density entries
//!   0.01         <kind char> <density>; the kind may be a space
//! . 1000
//! o 50
//! 4 6            height width
//! ######         `height` rows of at least `width` characters
//! #.. o#
//! #    #
//! ######
//! ```

use std::path::Path;

use fluxgrid_core::fixed::SimFixed;
use fluxgrid_core::grid::{RHO_SIZE, WALL};
use fluxgrid_core::state::SimulationDescription;

/// Errors from reading a scenario description.
#[derive(Debug, thiserror::Error)]
pub enum DescriptionError {
    #[error("description ended early, expected {what}")]
    UnexpectedEnd { what: &'static str },

    #[error("line {line}: invalid {what} '{value}'")]
    InvalidNumber {
        line: usize,
        what: &'static str,
        value: String,
    },

    #[error("line {line}: bad density entry '{content}', expected '<char> <value>'")]
    BadDensityEntry { line: usize, content: String },

    #[error("row {row} has {found} cells, expected {expected}")]
    ShortRow {
        row: usize,
        expected: usize,
        found: usize,
    },

    #[error("no density given for fluid kind {kind:?}")]
    MissingDensity { kind: char },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Cursor over description lines with 1-based line numbers.
struct Lines<'a> {
    inner: std::iter::Enumerate<std::str::Lines<'a>>,
}

impl<'a> Lines<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            inner: text.lines().enumerate(),
        }
    }

    /// Next line, verbatim apart from a trailing `\r`.
    fn raw(&mut self, what: &'static str) -> Result<(usize, &'a str), DescriptionError> {
        let (i, line) = self
            .inner
            .next()
            .ok_or(DescriptionError::UnexpectedEnd { what })?;
        Ok((i + 1, line.strip_suffix('\r').unwrap_or(line)))
    }

    /// Next line with content, trimmed.
    fn content(&mut self, what: &'static str) -> Result<(usize, &'a str), DescriptionError> {
        loop {
            let (n, line) = self.raw(what)?;
            let trimmed = line.trim();
            if !trimmed.is_empty() {
                return Ok((n, trimmed));
            }
        }
    }
}

fn parse_number<T: std::str::FromStr>(
    line: usize,
    what: &'static str,
    value: &str,
) -> Result<T, DescriptionError> {
    value.parse().map_err(|_| DescriptionError::InvalidNumber {
        line,
        what,
        value: value.to_string(),
    })
}

/// Parse a description from its text.
pub fn parse_description(text: &str) -> Result<SimulationDescription, DescriptionError> {
    let mut lines = Lines::new(text);

    let (n, g) = lines.content("gravity")?;
    let gravity = SimFixed::from_f64(parse_number::<f64>(n, "gravity", g)?);

    let (n, count) = lines.content("density count")?;
    let count: usize = parse_number(n, "density count", count)?;

    let mut rho = [SimFixed::zero(); RHO_SIZE];
    for _ in 0..count {
        let (n, line) = lines.raw("density entry")?;
        let bad = || DescriptionError::BadDensityEntry {
            line: n,
            content: line.to_string(),
        };
        let mut chars = line.chars();
        let kind = chars.next().filter(char::is_ascii).ok_or_else(bad)?;
        let value = chars.as_str().trim();
        if value.is_empty() {
            return Err(bad());
        }
        let density: f64 = parse_number(n, "density", value)?;
        rho[kind as usize] = SimFixed::from_f64(density);
    }

    let (n, dims) = lines.content("grid dimensions")?;
    let mut parts = dims.split_whitespace();
    let height: usize = parse_number(
        n,
        "height",
        parts.next().ok_or(DescriptionError::UnexpectedEnd { what: "height" })?,
    )?;
    let width: usize = parse_number(
        n,
        "width",
        parts.next().ok_or(DescriptionError::UnexpectedEnd { what: "width" })?,
    )?;

    let mut field = Vec::with_capacity(height * width);
    for row in 0..height {
        let (_, line) = lines.raw("grid row")?;
        let bytes = line.as_bytes();
        if bytes.len() < width {
            return Err(DescriptionError::ShortRow {
                row,
                expected: width,
                found: bytes.len(),
            });
        }
        field.extend_from_slice(&bytes[..width]);
    }

    let mut checked = [false; RHO_SIZE];
    for &kind in &field {
        if kind == WALL || checked[kind as usize] {
            continue;
        }
        checked[kind as usize] = true;
        if rho[kind as usize] == SimFixed::zero() {
            return Err(DescriptionError::MissingDensity {
                kind: char::from(kind),
            });
        }
    }

    log::debug!("parsed {height}x{width} description with {count} density entries");
    Ok(SimulationDescription {
        gravity,
        rho,
        height,
        width,
        field,
    })
}

/// Read and parse a description file.
pub fn load_description(path: &Path) -> Result<SimulationDescription, DescriptionError> {
    let text = std::fs::read_to_string(path)?;
    let desc = parse_description(&text)?;
    log::info!(
        "loaded {}x{} description from {}",
        desc.height,
        desc.width,
        path.display()
    );
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    const SAMPLE: &str = "0.1\n3\n  0.01\n. 1000\no 50\n4 6\n######\n#.. o#\n#    #\n######\n";

    #[test]
    fn parses_sample() {
        let desc = parse_description(SAMPLE).unwrap();
        assert_eq!(desc.gravity, SimFixed::from_f64(0.1));
        assert_eq!(desc.rho[b' ' as usize], SimFixed::from_f64(0.01));
        assert_eq!(desc.rho[b'.' as usize], SimFixed::from_int(1000));
        assert_eq!(desc.rho[b'o' as usize], SimFixed::from_int(50));
        assert_eq!((desc.height, desc.width), (4, 6));
        assert_eq!(&desc.field[6..12], b"#.. o#");
    }

    #[test]
    fn tolerates_crlf_and_long_rows() {
        let text = "1\r\n1\r\n. 1\r\n1 3\r\n#.#trailing\r\n";
        let desc = parse_description(text).unwrap();
        assert_eq!(desc.field, b"#.#");
    }

    #[test]
    fn short_row_is_an_error() {
        let text = "1\n1\n. 1\n2 3\n#.#\n#.\n";
        assert!(matches!(
            parse_description(text),
            Err(DescriptionError::ShortRow {
                row: 1,
                expected: 3,
                found: 2
            })
        ));
    }

    #[test]
    fn missing_rows_are_an_error() {
        let text = "1\n1\n. 1\n3 3\n###\n#.#\n";
        assert!(matches!(
            parse_description(text),
            Err(DescriptionError::UnexpectedEnd { what: "grid row" })
        ));
    }

    #[test]
    fn bad_density_entries() {
        assert!(matches!(
            parse_description("1\n1\n.\n1 1\n.\n"),
            Err(DescriptionError::BadDensityEntry { line: 3, .. })
        ));
        assert!(matches!(
            parse_description("1\n1\n. heavy\n1 1\n.\n"),
            Err(DescriptionError::InvalidNumber {
                line: 3,
                what: "density",
                ..
            })
        ));
    }

    #[test]
    fn unknown_kind_without_density() {
        assert!(matches!(
            parse_description("1\n1\n. 1\n1 3\n.x#\n"),
            Err(DescriptionError::MissingDensity { kind: 'x' })
        ));
    }

    #[test]
    fn bad_header_numbers() {
        assert!(matches!(
            parse_description("fast\n"),
            Err(DescriptionError::InvalidNumber { line: 1, what: "gravity", .. })
        ));
        assert!(matches!(
            parse_description(""),
            Err(DescriptionError::UnexpectedEnd { what: "gravity" })
        ));
        assert!(matches!(
            parse_description("1\n0\n4\n"),
            Err(DescriptionError::UnexpectedEnd { what: "width" })
        ));
    }

    #[test]
    fn loads_from_file() {
        let dir = std::env::temp_dir().join(format!("fluxgrid_desc_test_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("tank.txt");
        fs::write(&path, SAMPLE).unwrap();

        let desc = load_description(&path).unwrap();
        assert_eq!(desc.height, 4);

        let missing: PathBuf = dir.join("nope.txt");
        assert!(matches!(load_description(&missing), Err(DescriptionError::Io(_))));
        let _ = fs::remove_dir_all(&dir);
    }
}
