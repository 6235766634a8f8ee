//! MPlayer slave-mode wire format.
//!
//! Reference: http://www.mplayerhq.hu/DOCS/tech/slave.txt
//!
//! Commands are single lines of space-separated tokens on stdin. Output is
//! free-form text on stdout and stderr; the only framing the core relies on
//! is the newline and the startup banner.

use serde::{Deserialize, Serialize};

/// Fixed arguments: verbose module-level logging, status-line verbosity,
/// idle keep-alive, slave mode, fullscreen, borderless.
pub const STARTUP_ARGS: &[&str] = &[
  "-msglevel",
  "global=6",
  "-msglevel",
  "statusline=5",
  "-idle",
  "-slave",
  "-fs",
  "-noborder",
];

/// Substring of the startup banner that marks the player as ready.
pub const READY_SIGNATURE: &str = "MPlayer";

/// Format a command as one newline-terminated line.
pub fn format_command<I, S>(args: I) -> String
where
  I: IntoIterator<Item = S>,
  S: AsRef<str>,
{
  let mut line = String::new();
  for (i, arg) in args.into_iter().enumerate() {
    if i > 0 {
      line.push(' ');
    }
    line.push_str(arg.as_ref());
  }
  line.push('\n');
  line
}

/// Which pipe a chunk of output arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
  Stdout,
  Stderr,
}

impl OutputStream {
  pub fn as_str(&self) -> &'static str {
    match self {
      OutputStream::Stdout => "stdout",
      OutputStream::Stderr => "stderr",
    }
  }
}

/// How output chunks are cut into classifier lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineMode {
  /// Every chunk is split on its own. A line that straddles two reads is
  /// delivered as two lines.
  #[default]
  Chunked,
  /// Keep the unterminated tail of each stream and prepend it to the next
  /// chunk from the same stream.
  Reassembled,
}

/// Splits output chunks into lines according to a [`LineMode`].
///
/// Classifiers never see an empty line: empty pieces are dropped and a
/// trailing `\r` is stripped from every line.
#[derive(Debug, Default)]
pub struct LineSplitter {
  mode: LineMode,
  stdout_tail: Vec<u8>,
  stderr_tail: Vec<u8>,
}

impl LineSplitter {
  pub fn new(mode: LineMode) -> Self {
    Self {
      mode,
      stdout_tail: Vec::new(),
      stderr_tail: Vec::new(),
    }
  }

  /// Split one raw chunk.
  ///
  /// In `Reassembled` mode bytes are buffered until a newline arrives, so
  /// only complete lines are decoded and a UTF-8 sequence cut by a read
  /// boundary is put back together.
  pub fn split(&mut self, stream: OutputStream, chunk: &[u8]) -> Vec<String> {
    match self.mode {
      LineMode::Chunked => String::from_utf8_lossy(chunk)
        .split('\n')
        .filter_map(clean_line)
        .collect(),
      LineMode::Reassembled => {
        let tail = match stream {
          OutputStream::Stdout => &mut self.stdout_tail,
          OutputStream::Stderr => &mut self.stderr_tail,
        };
        tail.extend_from_slice(chunk);

        let Some(last_newline) = tail.iter().rposition(|&b| b == b'\n') else {
          return Vec::new();
        };
        let rest = tail.split_off(last_newline + 1);
        let complete = std::mem::replace(tail, rest);
        String::from_utf8_lossy(&complete)
          .split('\n')
          .filter_map(clean_line)
          .collect()
      }
    }
  }
}

fn clean_line(piece: &str) -> Option<String> {
  let line = piece.strip_suffix('\r').unwrap_or(piece);
  if line.is_empty() {
    None
  } else {
    Some(line.to_string())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_format_command() {
    assert_eq!(format_command(["get_property", "volume"]), "get_property volume\n");
    assert_eq!(format_command(vec!["pause".to_string()]), "pause\n");
  }

  #[test]
  fn test_chunked_split() {
    let mut splitter = LineSplitter::new(LineMode::Chunked);
    let lines = splitter.split(OutputStream::Stdout, b"ANS_volume=42\r\nANS_pause=no\n\n");
    assert_eq!(lines, vec!["ANS_volume=42", "ANS_pause=no"]);
  }

  #[test]
  fn test_blank_lines_never_reach_classifier() {
    for mode in [LineMode::Chunked, LineMode::Reassembled] {
      let mut splitter = LineSplitter::new(mode);
      let lines = splitter.split(OutputStream::Stderr, b"\n\r\n\n   \r\n\r\n");
      assert_eq!(lines, vec!["   "], "mode {:?}", mode);
    }
  }

  #[test]
  fn test_chunked_does_not_reassemble() {
    let mut splitter = LineSplitter::new(LineMode::Chunked);
    assert_eq!(splitter.split(OutputStream::Stdout, b"ANS_vol"), vec!["ANS_vol"]);
    assert_eq!(splitter.split(OutputStream::Stdout, b"ume=42\n"), vec!["ume=42"]);
  }

  #[test]
  fn test_reassembled_split() {
    let mut splitter = LineSplitter::new(LineMode::Reassembled);
    assert!(splitter.split(OutputStream::Stdout, b"ANS_vol").is_empty());
    // Partial stdout line must not leak into stderr.
    assert_eq!(splitter.split(OutputStream::Stderr, b"warning\n"), vec!["warning"]);
    assert_eq!(
      splitter.split(OutputStream::Stdout, b"ume=42\nANS_pa"),
      vec!["ANS_volume=42"]
    );
    assert_eq!(splitter.split(OutputStream::Stdout, b"use=no\n"), vec!["ANS_pause=no"]);
  }

  #[test]
  fn test_reassembled_split_keeps_utf8_intact() {
    let mut splitter = LineSplitter::new(LineMode::Reassembled);
    // "ö" is 0xC3 0xB6; the read boundary falls between the two bytes.
    assert!(splitter.split(OutputStream::Stdout, b"ANS_title=Bj\xC3").is_empty());
    assert_eq!(
      splitter.split(OutputStream::Stdout, b"\xB6rk\n"),
      vec!["ANS_title=Björk"]
    );
  }

  #[test]
  fn test_chunked_split_decodes_each_chunk() {
    let mut splitter = LineSplitter::new(LineMode::Chunked);
    let lines = splitter.split(OutputStream::Stdout, "ANS_title=Björk\n".as_bytes());
    assert_eq!(lines, vec!["ANS_title=Björk"]);
  }

  #[test]
  fn test_line_mode_serde() {
    let mode: LineMode = serde_json::from_str("\"reassembled\"").unwrap();
    assert_eq!(mode, LineMode::Reassembled);
    assert_eq!(serde_json::to_string(&LineMode::Chunked).unwrap(), "\"chunked\"");
  }
}
