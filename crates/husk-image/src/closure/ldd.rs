//! Grammar for `ldd` output lines, using `nom`.
//!
//! glibc and musl both print one dependency per line in a handful of
//! shapes:
//!
//! ```text
//! 	linux-vdso.so.1 (0x00007ffc8a5f2000)
//! 	libc.so.6 => /lib/x86_64-linux-gnu/libc.so.6 (0x00007f3b1c000000)
//! 	libmissing.so.2 => not found
//! 	/lib64/ld-linux-x86-64.so.2 (0x00007f3b1c400000)
//! 	statically linked
//! ```

use std::path::{Path, PathBuf};

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::{tag, take_till1},
    character::complete::{char, hex_digit1, space0, space1},
    combinator::{all_consuming, map, opt, value, verify},
    sequence::{delimited, preceded},
};

/// One parsed line of `ldd` output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LddEntry {
    /// `name => /path (0x...)`: a library found on disk.
    Resolved {
        /// Soname as requested by the binary.
        name: String,
        /// Host path the loader resolved it to.
        path: PathBuf,
    },
    /// `name => not found`.
    Missing {
        /// Soname that could not be resolved.
        name: String,
    },
    /// `/path (0x...)`: an object loaded by absolute path, usually the
    /// dynamic loader.
    Direct {
        /// Host path of the object.
        path: PathBuf,
    },
    /// `name (0x...)`: kernel-provided object with no backing file.
    Virtual {
        /// Name of the virtual object.
        name: String,
    },
    /// `statically linked` or `not a dynamic executable`.
    Static,
}

impl LddEntry {
    /// Host file this entry requires in the root, if any.
    #[must_use]
    pub fn host_path(&self) -> Option<&Path> {
        match self {
            Self::Resolved { path, .. } | Self::Direct { path } => Some(path),
            Self::Missing { .. } | Self::Virtual { .. } | Self::Static => None,
        }
    }
}

/// A line that matches none of the known shapes.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognised ldd output line: {line:?}")]
pub struct LddParseError {
    /// The offending line, trimmed.
    pub line: String,
}

/// A run of non-whitespace characters.
fn word(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn absolute_path(input: &str) -> IResult<&str, &str> {
    verify(word, |w: &str| w.starts_with('/')).parse(input)
}

/// Load address, e.g. `(0x00007ffc8a5f2000)`.
fn load_address(input: &str) -> IResult<&str, &str> {
    delimited(tag("(0x"), hex_digit1, char(')')).parse(input)
}

fn optional_address(input: &str) -> IResult<&str, Option<&str>> {
    opt(preceded(space1, load_address)).parse(input)
}

fn arrow(input: &str) -> IResult<&str, &str> {
    delimited(space1, tag("=>"), space0).parse(input)
}

fn static_marker(input: &str) -> IResult<&str, LddEntry> {
    value(
        LddEntry::Static,
        alt((tag("statically linked"), tag("not a dynamic executable"))),
    )
    .parse(input)
}

fn missing(input: &str) -> IResult<&str, LddEntry> {
    map((word, arrow, tag("not found")), |(name, _, _)| LddEntry::Missing {
        name: name.to_string(),
    })
    .parse(input)
}

fn resolved(input: &str) -> IResult<&str, LddEntry> {
    map(
        (word, arrow, absolute_path, optional_address),
        |(name, _, path, _)| LddEntry::Resolved {
            name: name.to_string(),
            path: PathBuf::from(path),
        },
    )
    .parse(input)
}

/// Older glibc prints vDSO entries as `name =>  (0x...)`.
fn unresolved_virtual(input: &str) -> IResult<&str, LddEntry> {
    map((word, arrow, load_address), |(name, _, _)| LddEntry::Virtual {
        name: name.to_string(),
    })
    .parse(input)
}

fn direct(input: &str) -> IResult<&str, LddEntry> {
    map((absolute_path, optional_address), |(path, _)| LddEntry::Direct {
        path: PathBuf::from(path),
    })
    .parse(input)
}

fn virtual_object(input: &str) -> IResult<&str, LddEntry> {
    map((word, space1, load_address), |(name, _, _)| LddEntry::Virtual {
        name: name.to_string(),
    })
    .parse(input)
}

/// Parses one line of `ldd` output. Surrounding whitespace is ignored.
///
/// # Errors
///
/// Returns [`LddParseError`] if the line matches no known shape.
pub fn parse_line(line: &str) -> Result<LddEntry, LddParseError> {
    let line = line.trim();
    all_consuming(alt((
        static_marker,
        missing,
        resolved,
        unresolved_virtual,
        direct,
        virtual_object,
    )))
    .parse(line)
    .map(|(_, entry)| entry)
    .map_err(|_| LddParseError {
        line: line.to_string(),
    })
}
