//! Line diffs for version commit messages.
//!
//! A longest-common-subsequence diff over lines, rendered as a listing of
//! added (`+`) and removed (`-`) lines under a one-line summary. The table
//! is quadratic, so inputs whose line-count product exceeds
//! [`MAX_DIFF_CELLS`] are refused with [`DiffError::TooLarge`].

use thiserror::Error;

/// Upper bound on `old_lines * new_lines`.
pub const MAX_DIFF_CELLS: usize = 4_000_000;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DiffError {
    #[error("inputs too large to diff: {old} x {new} lines")]
    TooLarge { old: usize, new: usize },
}

/// One line of a diff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLine<'a> {
    Same(&'a str),
    Added(&'a str),
    Removed(&'a str),
}

/// Diffs `old` against `new` line by line.
pub fn line_diff<'a>(old: &'a str, new: &'a str) -> Result<Vec<DiffLine<'a>>, DiffError> {
    let a: Vec<&str> = old.lines().collect();
    let b: Vec<&str> = new.lines().collect();
    let (n, m) = (a.len(), b.len());
    if n.saturating_mul(m) > MAX_DIFF_CELLS {
        return Err(DiffError::TooLarge { old: n, new: m });
    }

    // lcs[i][j] = LCS length of a[i..] and b[j..]
    let width = m + 1;
    let mut lcs = vec![0u32; (n + 1) * width];
    for i in (0..n).rev() {
        for j in (0..m).rev() {
            lcs[i * width + j] = if a[i] == b[j] {
                lcs[(i + 1) * width + j + 1] + 1
            } else {
                lcs[(i + 1) * width + j].max(lcs[i * width + j + 1])
            };
        }
    }

    let mut out = Vec::with_capacity(n.max(m));
    let (mut i, mut j) = (0, 0);
    while i < n && j < m {
        if a[i] == b[j] {
            out.push(DiffLine::Same(a[i]));
            i += 1;
            j += 1;
        } else if lcs[(i + 1) * width + j] >= lcs[i * width + j + 1] {
            out.push(DiffLine::Removed(a[i]));
            i += 1;
        } else {
            out.push(DiffLine::Added(b[j]));
            j += 1;
        }
    }
    out.extend(a[i..].iter().map(|l| DiffLine::Removed(*l)));
    out.extend(b[j..].iter().map(|l| DiffLine::Added(*l)));
    Ok(out)
}

/// Summary line followed by the changed lines.
pub fn commit_message(old: &str, new: &str) -> Result<String, DiffError> {
    let lines = line_diff(old, new)?;
    let added = lines.iter().filter(|l| matches!(l, DiffLine::Added(_))).count();
    let removed = lines.iter().filter(|l| matches!(l, DiffLine::Removed(_))).count();

    let mut message = format!("{} line(s) added, {} line(s) removed", added, removed);
    for line in &lines {
        match line {
            DiffLine::Added(text) => {
                message.push_str("\n+ ");
                message.push_str(text);
            }
            DiffLine::Removed(text) => {
                message.push_str("\n- ");
                message.push_str(text);
            }
            DiffLine::Same(_) => {}
        }
    }
    Ok(message)
}
