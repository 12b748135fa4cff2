//! # Frame symbolization
//!
//! The inspector treats symbol/line resolution as a black box behind the
//! [`Symbolizer`] trait. Two implementations ship here:
//!
//! - [`NullSymbolizer`]: addresses only, for hosts that do their own
//!   symbolization or tests that don't care.
//! - [`DwarfSymbolizer`]: loads one binary image of the target with `object`,
//!   builds an `addr2line` context over its DWARF sections, and demangles
//!   with `rustc-demangle`. Lazily initialized; a broken image degrades to
//!   unsymbolized frames instead of failing lookups.

use std::borrow::Cow;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use addr2line::Context;
use gimli::{Dwarf, EndianArcSlice, RunTimeEndian, SectionId};
use object::{Object, ObjectSection, ObjectSegment};
use once_cell::sync::OnceCell;
use rustc_demangle::try_demangle;
use thiserror::Error;
use tracing::debug;

use crate::types::{Address, SourceLocation, SymbolName};

type OwnedReader = EndianArcSlice<RunTimeEndian>;

/// Symbol and source location for one instruction pointer.
#[derive(Debug, Clone)]
pub struct FrameSymbol
{
    /// Function name (demangled when possible).
    pub name: SymbolName,
    /// Source location, if line information exists.
    pub location: Option<SourceLocation>,
}

/// Black-box address-to-symbol lookup.
pub trait Symbolizer
{
    /// Best-effort symbolication; `None` when nothing is known for `address`.
    fn symbolicate(&self, address: Address) -> Option<FrameSymbol>;
}

/// Symbolizer that knows nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSymbolizer;

impl Symbolizer for NullSymbolizer
{
    fn symbolicate(&self, _address: Address) -> Option<FrameSymbol>
    {
        None
    }
}

/// Failures while loading a binary image for symbolization.
#[derive(Error, Debug)]
pub enum SymbolizerError
{
    /// The image file could not be read.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The image file is not a parseable object file.
    #[error("failed to parse {path}: {details}")]
    Parse
    {
        /// Path of the offending image.
        path: PathBuf,
        /// Parser detail.
        details: String,
    },
}

/// DWARF-backed symbolizer for a single mapped binary image.
pub struct DwarfSymbolizer
{
    path: PathBuf,
    endian: RunTimeEndian,
    slide: i64,
    runtime_range: (u64, u64),
    sections: HashMap<&'static str, Arc<[u8]>>,
    context_cache: OnceCell<Option<Context<OwnedReader>>>,
}

impl DwarfSymbolizer
{
    /// Load `path` as the image mapped at `load_address` in the target.
    ///
    /// ## Errors
    ///
    /// - `Io` / `Parse`: the file is unreadable or not an object file.
    pub fn load(path: impl Into<PathBuf>, load_address: Address) -> Result<Self, SymbolizerError>
    {
        let path = path.into();
        let bytes = fs::read(&path)?;
        let data = Arc::<[u8]>::from(bytes);
        let file = object::File::parse(&*data).map_err(|err| SymbolizerError::Parse {
            path: path.clone(),
            details: err.to_string(),
        })?;

        let endian = if file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let text_vmaddr = file
            .segments()
            .find(|segment| matches!(segment.name(), Ok(Some(name)) if name == "__TEXT" || name == ".text"))
            .map_or_else(|| file.segments().map(|s| s.address()).min().unwrap_or(0), |s| s.address());

        let mut max_addr = text_vmaddr;
        for segment in file.segments() {
            let end = segment.address().saturating_add(segment.size());
            max_addr = max_addr.max(end);
        }

        let size = max_addr.saturating_sub(text_vmaddr);
        let slide = load_address.value() as i64 - text_vmaddr as i64;

        let mut sections = HashMap::new();
        for (canonical, aliases) in DWARF_SECTIONS {
            sections.insert(*canonical, load_section_bytes(&file, aliases));
        }

        Ok(Self {
            path,
            endian,
            slide,
            runtime_range: (load_address.value(), load_address.value().saturating_add(size)),
            sections,
            context_cache: OnceCell::new(),
        })
    }

    /// Path of the loaded image.
    pub fn path(&self) -> &Path
    {
        &self.path
    }

    /// Returns `true` when `address` falls inside the mapped image.
    pub fn contains(&self, address: Address) -> bool
    {
        let addr = address.value();
        addr >= self.runtime_range.0 && addr < self.runtime_range.1
    }

    fn file_address(&self, address: Address) -> Option<u64>
    {
        if !self.contains(address) {
            return None;
        }
        let value = address.value();
        if self.slide >= 0 {
            value.checked_sub(self.slide as u64)
        } else {
            value.checked_add(self.slide.unsigned_abs())
        }
    }

    fn section_reader(&self, id: SectionId) -> OwnedReader
    {
        let data = self
            .sections
            .get(id.name())
            .cloned()
            .unwrap_or_else(|| Arc::<[u8]>::from(Vec::new()));
        EndianArcSlice::new(data, self.endian)
    }

    fn context(&self) -> Option<&Context<OwnedReader>>
    {
        self.context_cache
            .get_or_init(|| {
                let dwarf = match Dwarf::load(|section| Ok::<_, gimli::Error>(self.section_reader(section))) {
                    Ok(dwarf) => dwarf,
                    Err(err) => {
                        debug!(path = %self.path.display(), %err, "failed to load DWARF sections");
                        return None;
                    }
                };
                match Context::from_dwarf(dwarf) {
                    Ok(context) => Some(context),
                    Err(err) => {
                        debug!(path = %self.path.display(), %err, "failed to build addr2line context");
                        None
                    }
                }
            })
            .as_ref()
    }
}

impl Symbolizer for DwarfSymbolizer
{
    fn symbolicate(&self, address: Address) -> Option<FrameSymbol>
    {
        let file_addr = self.file_address(address)?;
        let ctx = self.context()?;

        let lookup = ctx.find_frames(file_addr);
        let mut frame_iter = lookup.skip_all_loads().ok()?;

        // Innermost frame wins; inline parents collapse into it.
        while let Ok(Some(frame)) = frame_iter.next() {
            let Some(raw) = frame.function.as_ref().and_then(|func| func.raw_name().ok()) else {
                continue;
            };
            let location = frame.location.and_then(|loc| {
                loc.file.map(|file| SourceLocation {
                    file: file.to_string(),
                    line: loc.line,
                })
            });

            return Some(FrameSymbol {
                name: make_symbol_name(raw.to_string()),
                location,
            });
        }

        None
    }
}

const DWARF_SECTIONS: &[(&str, &[&str])] = &[
    (".debug_abbrev", &[".debug_abbrev", "__debug_abbrev"]),
    (".debug_addr", &[".debug_addr", "__debug_addr"]),
    (".debug_aranges", &[".debug_aranges", "__debug_aranges"]),
    (".debug_info", &[".debug_info", "__debug_info"]),
    (".debug_line", &[".debug_line", "__debug_line"]),
    (".debug_line_str", &[".debug_line_str", "__debug_line_str"]),
    (".debug_ranges", &[".debug_ranges", "__debug_ranges"]),
    (".debug_rnglists", &[".debug_rnglists", "__debug_rnglists"]),
    (".debug_str", &[".debug_str", "__debug_str"]),
    (".debug_str_offsets", &[".debug_str_offsets", "__debug_str_offsets"]),
];

fn load_section_bytes<'data>(file: &object::File<'data>, names: &[&str]) -> Arc<[u8]>
{
    for name in names {
        if let Some(section) = file.section_by_name(name) {
            if let Ok(data) = section.uncompressed_data() {
                return match data {
                    Cow::Borrowed(bytes) => Arc::<[u8]>::from(bytes.to_vec()),
                    Cow::Owned(vec) => vec.into(),
                };
            }
        }
    }

    Arc::<[u8]>::from(Vec::new())
}

fn make_symbol_name(raw: String) -> SymbolName
{
    let demangled = try_demangle(&raw).ok().map(|d| d.to_string());
    SymbolName::new(raw, demangled)
}
