//! Sample line matcher.
//!
//! Matching rules for one line (no trailing `\n`):
//! - `name` is `[a-zA-Z_:][a-zA-Z0-9_:]*` starting at byte 0.
//! - An optional `{...}` block follows the name directly. Its closing brace is
//!   the rightmost `}` followed by a separator and a sample byte, so a label
//!   value containing such a sequence is mis-split. That case is left as is.
//! - An empty block `{}` counts as a block, so `up{} 1` becomes
//!   `up{job="a"} 1`. Regex relays built on `\{[^\}].*\}` leave such a line
//!   untouched instead.
//! - Exactly one space or tab, then a non-empty run of `[0-9eE.+-]`.
//! - Anything after the run (timestamp, `\r`) is kept verbatim.

use bytes::{BufMut, BytesMut};

/// A matched sample line, borrowed from the line buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetricSeries<'a> {
    /// Metric name.
    pub name: &'a [u8],
    /// Existing label block including both braces.
    pub labels: Option<&'a [u8]>,
    /// Sample value text (never reparsed).
    pub sample: &'a [u8],
    /// Everything from the separator to the end of the line.
    tail: &'a [u8],
}

fn is_name_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':'
}

fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b':'
}

fn is_separator(b: u8) -> bool {
    b == b' ' || b == b'\t'
}

fn is_sample_char(b: u8) -> bool {
    b.is_ascii_digit() || matches!(b, b'e' | b'E' | b'.' | b'+' | b'-')
}

/// True when `line[at]` is a separator followed by a sample byte.
fn sample_follows(line: &[u8], at: usize) -> bool {
    matches!(
        (line.get(at), line.get(at + 1)),
        (Some(&s), Some(&c)) if is_separator(s) && is_sample_char(c)
    )
}

impl<'a> MetricSeries<'a> {
    /// Match `line` against the sample grammar.
    pub fn parse(line: &'a [u8]) -> Option<Self> {
        let first = *line.first()?;
        if !is_name_start(first) {
            return None;
        }
        let name_end = line
            .iter()
            .skip(1)
            .position(|&b| !is_name_char(b))
            .map_or(line.len(), |p| p + 1);

        let (labels, sep_at) = if line.get(name_end) == Some(&b'{') {
            let close = (name_end + 1..line.len())
                .rev()
                .find(|&j| line[j] == b'}' && sample_follows(line, j + 1))?;
            (Some(&line[name_end..=close]), close + 1)
        } else {
            if !sample_follows(line, name_end) {
                return None;
            }
            (None, name_end)
        };

        let sample_start = sep_at + 1;
        let sample_end = line[sample_start..]
            .iter()
            .position(|&b| !is_sample_char(b))
            .map_or(line.len(), |p| sample_start + p);

        Some(Self {
            name: &line[..name_end],
            labels,
            sample: &line[sample_start..sample_end],
            tail: &line[sep_at..],
        })
    }

    /// Write the line with `joined` (`k="v",...`) injected into its label set.
    /// An empty `joined` reproduces the original line.
    pub fn write_injected(&self, joined: &[u8], out: &mut BytesMut) {
        out.put_slice(self.name);
        match self.labels {
            _ if joined.is_empty() => {
                if let Some(block) = self.labels {
                    out.put_slice(block);
                }
            }
            None => {
                out.put_u8(b'{');
                out.put_slice(joined);
                out.put_u8(b'}');
            }
            Some(block) => {
                // block is at least `{}`
                let open = &block[..block.len() - 1];
                out.put_slice(open);
                if open.len() > 1 {
                    out.put_u8(b',');
                }
                out.put_slice(joined);
                out.put_u8(b'}');
            }
        }
        out.put_slice(self.tail);
    }
}
