//! Unified diff parsing and line lookup.
//!
//! Parsing never fails: headers that do not match `@@ -a[,b] +c[,d] @@` are
//! skipped together with their lines, so unexpected input produces a sparser
//! index rather than an error.

use std::collections::BTreeMap;

use crate::convert::code_fence;

/// Lines shown on each side of the target by [`DiffHunk::format_context`].
pub const DEFAULT_CONTEXT_RADIUS: usize = 3;

/// Classification of one hunk line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    /// Present only in the new file (`+`).
    Added,
    /// Present only in the old file (`-`).
    Removed,
    /// Present in both files.
    Context,
}

impl LineKind {
    const fn marker(self) -> char {
        match self {
            Self::Added => '+',
            Self::Removed => '-',
            Self::Context => ' ',
        }
    }
}

/// One line of a hunk without its marker character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    /// Line classification.
    pub kind: LineKind,
    /// Text after the marker.
    pub content: String,
}

/// A contiguous changed region of one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffHunk {
    /// New-side path of the file.
    pub file_path: String,
    /// The `@@ ... @@` header line as it appeared in the diff.
    pub header: String,
    /// First old-file line number.
    pub old_start: u32,
    /// Number of old-file lines covered.
    pub old_count: u32,
    /// First new-file line number.
    pub new_start: u32,
    /// Number of new-file lines covered.
    pub new_count: u32,
    /// Hunk body in order.
    pub lines: Vec<DiffLine>,
}

/// A hunk line with its old and new line numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberedLine<'a> {
    /// Old-file number, absent for added lines.
    pub old: Option<u32>,
    /// New-file number, absent for removed lines.
    pub new: Option<u32>,
    /// The line itself.
    pub line: &'a DiffLine,
}

impl DiffHunk {
    /// Replays the hunk counters, pairing each line with its numbers.
    pub fn numbered_lines(&self) -> impl Iterator<Item = NumberedLine<'_>> {
        let mut old = self.old_start;
        let mut new = self.new_start;
        self.lines.iter().map(move |line| {
            match line.kind {
                LineKind::Added => {
                    let current = new;
                    new = new.saturating_add(1);
                    NumberedLine {
                        old: None,
                        new: Some(current),
                        line,
                    }
                }
                LineKind::Removed => {
                    let current = old;
                    old = old.saturating_add(1);
                    NumberedLine {
                        old: Some(current),
                        new: None,
                        line,
                    }
                }
                LineKind::Context => {
                    let (current_old, current_new) = (old, new);
                    old = old.saturating_add(1);
                    new = new.saturating_add(1);
                    NumberedLine {
                        old: Some(current_old),
                        new: Some(current_new),
                        line,
                    }
                }
            }
        })
    }

    /// Returns true when an added or context line carries new number `line`.
    #[must_use]
    pub fn contains_new_line(&self, line: u32) -> bool {
        self.numbered_lines().any(|numbered| numbered.new == Some(line))
    }

    /// Returns true when a removed or context line carries old number `line`.
    #[must_use]
    pub fn contains_old_line(&self, line: u32) -> bool {
        self.numbered_lines().any(|numbered| numbered.old == Some(line))
    }

    /// Renders a fenced `diff` block with the header and up to `radius` lines
    /// either side of the line whose new number is `target`. The fence
    /// outgrows any backtick run inside the excerpt.
    ///
    /// When no line carries that new number the whole hunk is shown.
    #[must_use]
    pub fn format_context(&self, target: u32, radius: usize) -> String {
        let position = self
            .numbered_lines()
            .position(|numbered| numbered.new == Some(target));
        let (start, len) = position.map_or((0, self.lines.len()), |index| {
            let first = index.saturating_sub(radius);
            let past_last = index.saturating_add(radius).saturating_add(1);
            (first, past_last.saturating_sub(first))
        });

        let mut body = self.header.clone();
        body.push('\n');
        for line in self.lines.iter().skip(start).take(len) {
            body.push(line.kind.marker());
            body.push_str(&line.content);
            body.push('\n');
        }
        let fence = code_fence(&body);
        format!("{fence}diff\n{body}{fence}")
    }
}

/// Hunks of a multi-file diff, keyed by file path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffIndex {
    files: BTreeMap<String, Vec<DiffHunk>>,
}

impl DiffIndex {
    /// Parses unified diff text.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let mut parser = Parser::default();
        for line in text.lines() {
            parser.feed(line);
        }
        parser.finish()
    }

    /// Returns true when no hunk was recognised.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Paths that have at least one hunk, in lexical order.
    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.files.keys().map(String::as_str)
    }

    /// Hunks recorded for `path`.
    #[must_use]
    pub fn hunks(&self, path: &str) -> &[DiffHunk] {
        self.files.get(path).map_or(&[], Vec::as_slice)
    }

    /// Finds the hunk covering `line` in `path`.
    ///
    /// New-side numbering is tried first across all hunks, then old-side
    /// numbering, so comments anchored to removed lines still resolve.
    #[must_use]
    pub fn hunk_for(&self, path: &str, line: u32) -> Option<&DiffHunk> {
        let hunks = self.hunks(path);
        hunks
            .iter()
            .find(|hunk| hunk.contains_new_line(line))
            .or_else(|| hunks.iter().find(|hunk| hunk.contains_old_line(line)))
    }

    /// Renders the context block for a comment at `path:line`, if any hunk
    /// covers it.
    #[must_use]
    pub fn format_diff_context(&self, path: &str, line: u32) -> Option<String> {
        self.hunk_for(path, line)
            .map(|hunk| hunk.format_context(line, DEFAULT_CONTEXT_RADIUS))
    }
}

struct OpenHunk {
    hunk: DiffHunk,
    old_remaining: u32,
    new_remaining: u32,
}

impl OpenHunk {
    const fn is_complete(&self) -> bool {
        self.old_remaining == 0 && self.new_remaining == 0
    }

    fn push(&mut self, raw: &str) {
        let (kind, content) = if let Some(rest) = raw.strip_prefix('+') {
            self.new_remaining = self.new_remaining.saturating_sub(1);
            (LineKind::Added, rest)
        } else if let Some(rest) = raw.strip_prefix('-') {
            self.old_remaining = self.old_remaining.saturating_sub(1);
            (LineKind::Removed, rest)
        } else {
            self.old_remaining = self.old_remaining.saturating_sub(1);
            self.new_remaining = self.new_remaining.saturating_sub(1);
            (LineKind::Context, raw.strip_prefix(' ').unwrap_or(raw))
        };
        self.hunk.lines.push(DiffLine {
            kind,
            content: content.to_owned(),
        });
    }
}

#[derive(Default)]
struct Parser {
    files: BTreeMap<String, Vec<DiffHunk>>,
    path: Option<String>,
    open: Option<OpenHunk>,
}

impl Parser {
    fn feed(&mut self, line: &str) {
        if let Some(rest) = line.strip_prefix("diff --git ") {
            self.close();
            self.path = rest.split_once(" b/").map(|(_, path)| path.to_owned());
            return;
        }
        if line.starts_with("@@") {
            self.close();
            self.open = self.path.clone().and_then(|path| open_hunk(path, line));
            if self.open.as_ref().is_some_and(OpenHunk::is_complete) {
                self.close();
            }
            return;
        }
        if line.starts_with('\\') {
            return;
        }

        match self.open.as_mut() {
            Some(open) => {
                open.push(line);
                if open.is_complete() {
                    self.close();
                }
            }
            None => self.observe_file_header(line),
        }
    }

    /// Diffs without `diff --git` lines name the file in `+++ b/<path>`.
    fn observe_file_header(&mut self, line: &str) {
        let Some(raw_target) = line.strip_prefix("+++ ") else {
            return;
        };
        let target = raw_target.split('\t').next().unwrap_or(raw_target);
        if target != "/dev/null" {
            self.path = Some(target.strip_prefix("b/").unwrap_or(target).to_owned());
        }
    }

    fn close(&mut self) {
        if let Some(open) = self.open.take() {
            self.files
                .entry(open.hunk.file_path.clone())
                .or_default()
                .push(open.hunk);
        }
    }

    fn finish(mut self) -> DiffIndex {
        self.close();
        DiffIndex { files: self.files }
    }
}

fn open_hunk(file_path: String, header: &str) -> Option<OpenHunk> {
    let (old_start, old_count, new_start, new_count) = parse_header(header)?;
    Some(OpenHunk {
        hunk: DiffHunk {
            file_path,
            header: header.to_owned(),
            old_start,
            old_count,
            new_start,
            new_count,
            lines: Vec::new(),
        },
        old_remaining: old_count,
        new_remaining: new_count,
    })
}

fn parse_header(header: &str) -> Option<(u32, u32, u32, u32)> {
    let rest = header.strip_prefix("@@ -")?;
    let (ranges, _) = rest.split_once(" @@")?;
    let (old, new) = ranges.split_once(" +")?;
    let (old_start, old_count) = parse_range(old.trim())?;
    let (new_start, new_count) = parse_range(new.trim())?;
    Some((old_start, old_count, new_start, new_count))
}

fn parse_range(range: &str) -> Option<(u32, u32)> {
    match range.split_once(',') {
        Some((start, count)) => Some((start.parse().ok()?, count.parse().ok()?)),
        None => Some((range.parse().ok()?, 1)),
    }
}
