//! RENDER picture format catalog
//!
//! The catalog is the decoded form of a QueryPictFormats reply: a flat list
//! of picture formats plus per-screen depth and visual tables that refer back
//! into it by index. It is built once per connection and never mutated.

use crate::error::{DecodeError, Error};
use crate::protocol::wire::WireReader;
use crate::protocol::*;
use std::collections::HashMap;
use std::io;
use std::ops::Range;

/// Wire size of one PictFormInfo
pub const FORMAT_RECORD_LEN: u64 = 28;
/// Wire size of one PictScreen header
pub const SCREEN_RECORD_LEN: u64 = 8;
/// Wire size of one PictDepth header
pub const DEPTH_RECORD_LEN: u64 = 8;
/// Wire size of one PictVisual
pub const VISUAL_RECORD_LEN: u64 = 8;
/// Wire size of one subpixel order entry
pub const SUBPIXEL_RECORD_LEN: u64 = 4;

/// First version whose reply carries the subpixel array
pub const SUBPIXEL_VERSION: RenderVersion = RenderVersion::new(0, 6);

const MAX_INT: u64 = i32::MAX as u64;

impl From<io::Error> for DecodeError {
    fn from(_: io::Error) -> Self {
        DecodeError::ShortRead
    }
}

/// Picture format class
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PictType {
    Indexed = 0,
    Direct = 1,
}

impl PictType {
    fn from_u8(value: u8) -> Self {
        if value == 0 {
            PictType::Indexed
        } else {
            PictType::Direct
        }
    }
}

/// Channel offsets and masks of a direct format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectFormat {
    pub red: u16,
    pub red_mask: u16,
    pub green: u16,
    pub green_mask: u16,
    pub blue: u16,
    pub blue_mask: u16,
    pub alpha: u16,
    pub alpha_mask: u16,
}

/// One picture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PictFormat {
    pub id: PictFormatId,
    pub kind: PictType,
    pub depth: u8,
    pub direct: DirectFormat,
    pub colormap: Colormap,
}

/// Field selectors for `find_format`
pub mod format_mask {
    pub const ID: u32 = 1 << 0;
    pub const TYPE: u32 = 1 << 1;
    pub const DEPTH: u32 = 1 << 2;
    pub const RED: u32 = 1 << 3;
    pub const RED_MASK: u32 = 1 << 4;
    pub const GREEN: u32 = 1 << 5;
    pub const GREEN_MASK: u32 = 1 << 6;
    pub const BLUE: u32 = 1 << 7;
    pub const BLUE_MASK: u32 = 1 << 8;
    pub const ALPHA: u32 = 1 << 9;
    pub const ALPHA_MASK: u32 = 1 << 10;
    pub const COLORMAP: u32 = 1 << 11;
}

impl PictFormat {
    /// True if every field selected by `mask` equals the template's
    pub fn matches(&self, mask: u32, template: &PictFormat) -> bool {
        use format_mask::*;

        let (d, t) = (&self.direct, &template.direct);
        let checks = [
            (ID, self.id == template.id),
            (TYPE, self.kind == template.kind),
            (DEPTH, self.depth == template.depth),
            (RED, d.red == t.red),
            (RED_MASK, d.red_mask == t.red_mask),
            (GREEN, d.green == t.green),
            (GREEN_MASK, d.green_mask == t.green_mask),
            (BLUE, d.blue == t.blue),
            (BLUE_MASK, d.blue_mask == t.blue_mask),
            (ALPHA, d.alpha == t.alpha),
            (ALPHA_MASK, d.alpha_mask == t.alpha_mask),
            (COLORMAP, self.colormap == template.colormap),
        ];
        checks.iter().all(|&(bit, equal)| mask & bit == 0 || equal)
    }

    fn decode(r: &mut WireReader<'_>) -> io::Result<Self> {
        let id = PictFormatId::new(r.read_u32()?);
        let kind = PictType::from_u8(r.read_u8()?);
        let depth = r.read_u8()?;
        r.skip(2)?;
        let direct = DirectFormat {
            red: r.read_u16()?,
            red_mask: r.read_u16()?,
            green: r.read_u16()?,
            green_mask: r.read_u16()?,
            blue: r.read_u16()?,
            blue_mask: r.read_u16()?,
            alpha: r.read_u16()?,
            alpha_mask: r.read_u16()?,
        };
        let colormap = Colormap::new(r.read_u32()?);
        Ok(PictFormat {
            id,
            kind,
            depth,
            direct,
            colormap,
        })
    }
}

/// The five formats every RENDER server provides
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StandardFormat {
    Argb32,
    Rgb24,
    A8,
    A4,
    A1,
}

const fn direct_template(depth: u8, direct: DirectFormat) -> PictFormat {
    PictFormat {
        id: PictFormatId(0),
        kind: PictType::Direct,
        depth,
        direct,
        colormap: Colormap(XID(0)),
    }
}

const fn alpha_only(depth: u8, alpha_mask: u16) -> PictFormat {
    direct_template(
        depth,
        DirectFormat {
            red: 0,
            red_mask: 0,
            green: 0,
            green_mask: 0,
            blue: 0,
            blue_mask: 0,
            alpha: 0,
            alpha_mask,
        },
    )
}

const ALPHA_ONLY_MASK: u32 = format_mask::TYPE
    | format_mask::DEPTH
    | format_mask::RED_MASK
    | format_mask::GREEN_MASK
    | format_mask::BLUE_MASK
    | format_mask::ALPHA
    | format_mask::ALPHA_MASK;

impl StandardFormat {
    /// Template and field mask identifying this format
    pub fn template(self) -> (PictFormat, u32) {
        use format_mask::*;

        let rgb = DirectFormat {
            red: 16,
            red_mask: 0xff,
            green: 8,
            green_mask: 0xff,
            blue: 0,
            blue_mask: 0xff,
            alpha: 24,
            alpha_mask: 0xff,
        };
        let channels = RED | RED_MASK | GREEN | GREEN_MASK | BLUE | BLUE_MASK;

        match self {
            StandardFormat::Argb32 => (
                direct_template(32, rgb),
                TYPE | DEPTH | channels | ALPHA | ALPHA_MASK,
            ),
            StandardFormat::Rgb24 => (
                direct_template(
                    24,
                    DirectFormat {
                        alpha: 0,
                        alpha_mask: 0,
                        ..rgb
                    },
                ),
                TYPE | DEPTH | channels | ALPHA_MASK,
            ),
            StandardFormat::A8 => (alpha_only(8, 0xff), ALPHA_ONLY_MASK),
            StandardFormat::A4 => (alpha_only(4, 0x0f), ALPHA_ONLY_MASK),
            StandardFormat::A1 => (alpha_only(1, 0x01), ALPHA_ONLY_MASK),
        }
    }
}

/// Subpixel geometry of a screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubpixelOrder {
    Unknown = 0,
    HorizontalRgb = 1,
    HorizontalBgr = 2,
    VerticalRgb = 3,
    VerticalBgr = 4,
    None = 5,
}

impl SubpixelOrder {
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => SubpixelOrder::HorizontalRgb,
            2 => SubpixelOrder::HorizontalBgr,
            3 => SubpixelOrder::VerticalRgb,
            4 => SubpixelOrder::VerticalBgr,
            5 => SubpixelOrder::None,
            _ => SubpixelOrder::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenInfo {
    /// Index of the fallback format
    pub fallback: usize,
    pub subpixel: SubpixelOrder,
    depths: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepthInfo {
    pub depth: u8,
    visuals: Range<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisualInfo {
    pub visual: VisualID,
    /// Index of the visual's format
    pub format: usize,
}

/// Check declared counts against overflow-safe limits and return the number
/// of bytes the structured part of the reply needs.
pub fn validate_counts(counts: &PictFormatsCounts, length: u32) -> Result<u64, DecodeError> {
    let limits = [
        ("format", counts.formats, FORMAT_RECORD_LEN),
        ("screen", counts.screens, SCREEN_RECORD_LEN),
        ("depth", counts.depths, DEPTH_RECORD_LEN),
        ("visual", counts.visuals, VISUAL_RECORD_LEN),
        ("subpixel", counts.subpixels, SUBPIXEL_RECORD_LEN),
    ];
    for (what, count, size) in limits {
        let limit = (MAX_INT / 4) / size;
        if count as u64 >= limit {
            return Err(DecodeError::CountOverflow {
                what,
                count,
                limit: limit as u32,
            });
        }
    }
    if length as u64 >= MAX_INT >> 2 {
        return Err(DecodeError::CountOverflow {
            what: "length",
            count: length,
            limit: (MAX_INT >> 2) as u32,
        });
    }

    let required = limits
        .iter()
        .map(|&(_, count, size)| count as u64 * size)
        .sum();
    let declared = length as u64 * 4;
    if declared < required {
        return Err(DecodeError::Truncated { declared, required });
    }
    Ok(required)
}

fn allocate<T>(count: u32) -> Result<Vec<T>, Error> {
    let mut v = Vec::new();
    v.try_reserve_exact(count as usize)
        .map_err(|_| Error::AllocationFailure)?;
    Ok(v)
}

/// Decoded QueryPictFormats reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatCatalog {
    version: RenderVersion,
    formats: Vec<PictFormat>,
    screens: Vec<ScreenInfo>,
    depths: Vec<DepthInfo>,
    visuals: Vec<VisualInfo>,
}

impl FormatCatalog {
    /// Decode the structured part of a reply. `payload` must hold at least
    /// the bytes `validate_counts` asked for.
    pub fn decode(
        payload: &[u8],
        counts: &PictFormatsCounts,
        byte_order: ByteOrder,
        version: RenderVersion,
    ) -> Result<Self, Error> {
        let mut catalog = FormatCatalog {
            version,
            formats: allocate(counts.formats)?,
            screens: allocate(counts.screens)?,
            depths: allocate(counts.depths)?,
            visuals: allocate(counts.visuals)?,
        };
        let mut index = HashMap::new();
        index
            .try_reserve(counts.formats as usize)
            .map_err(|_| Error::AllocationFailure)?;

        let mut r = WireReader::new(payload, byte_order);
        catalog.walk(&mut r, counts, &mut index)?;
        Ok(catalog)
    }

    fn walk(
        &mut self,
        r: &mut WireReader<'_>,
        counts: &PictFormatsCounts,
        index: &mut HashMap<PictFormatId, usize>,
    ) -> Result<(), DecodeError> {
        for _ in 0..counts.formats {
            let format = PictFormat::decode(r)?;
            index.entry(format.id).or_insert(self.formats.len());
            self.formats.push(format);
        }
        let resolve = |id: u32| {
            index
                .get(&PictFormatId::new(id))
                .copied()
                .ok_or(DecodeError::UnknownFormat(id))
        };

        let mut depths_left = counts.depths;
        let mut visuals_left = counts.visuals;

        for _ in 0..counts.screens {
            let ndepths = r.read_u32()?;
            let fallback = resolve(r.read_u32()?)?;
            if ndepths > depths_left {
                return Err(DecodeError::NestedOverflow {
                    what: "depth",
                    count: ndepths,
                    remaining: depths_left,
                });
            }
            depths_left -= ndepths;

            let first_depth = self.depths.len();
            for _ in 0..ndepths {
                let depth = r.read_u8()?;
                r.skip(1)?;
                let nvisuals = r.read_u16()? as u32;
                r.skip(4)?;
                if nvisuals > visuals_left {
                    return Err(DecodeError::NestedOverflow {
                        what: "visual",
                        count: nvisuals,
                        remaining: visuals_left,
                    });
                }
                visuals_left -= nvisuals;

                let first_visual = self.visuals.len();
                for _ in 0..nvisuals {
                    let visual = VisualID::new(r.read_u32()?);
                    let format = resolve(r.read_u32()?)?;
                    self.visuals.push(VisualInfo { visual, format });
                }
                self.depths.push(DepthInfo {
                    depth,
                    visuals: first_visual..self.visuals.len(),
                });
            }

            self.screens.push(ScreenInfo {
                fallback,
                subpixel: SubpixelOrder::Unknown,
                depths: first_depth..self.depths.len(),
            });
        }

        if self.version >= SUBPIXEL_VERSION {
            let n = (counts.subpixels as usize).min(self.screens.len());
            for screen in self.screens.iter_mut().take(n) {
                screen.subpixel = SubpixelOrder::from_u32(r.read_u32()?);
            }
        }
        Ok(())
    }

    pub fn version(&self) -> RenderVersion {
        self.version
    }

    pub fn formats(&self) -> &[PictFormat] {
        &self.formats
    }

    pub fn screens(&self) -> &[ScreenInfo] {
        &self.screens
    }

    pub fn format(&self, index: usize) -> Option<&PictFormat> {
        self.formats.get(index)
    }

    pub fn depths(&self, screen: &ScreenInfo) -> &[DepthInfo] {
        &self.depths[screen.depths.clone()]
    }

    pub fn visuals(&self, depth: &DepthInfo) -> &[VisualInfo] {
        &self.visuals[depth.visuals.clone()]
    }

    pub fn fallback_format(&self, screen: &ScreenInfo) -> &PictFormat {
        &self.formats[screen.fallback]
    }

    /// Format attached to `visual` on any screen
    pub fn find_visual_format(&self, visual: VisualID) -> Option<&PictFormat> {
        self.visuals
            .iter()
            .find(|v| v.visual == visual)
            .map(|v| &self.formats[v.format])
    }

    /// Position of the `skip`+1-th format matching `template` on `mask`
    pub fn find_format_index(&self, mask: u32, template: &PictFormat, skip: usize) -> Option<usize> {
        self.formats
            .iter()
            .enumerate()
            .filter(|(_, f)| f.matches(mask, template))
            .nth(skip)
            .map(|(i, _)| i)
    }

    pub fn find_format(&self, mask: u32, template: &PictFormat, skip: usize) -> Option<&PictFormat> {
        self.find_format_index(mask, template, skip)
            .map(|i| &self.formats[i])
    }

    pub fn find_standard_format(&self, kind: StandardFormat) -> Option<&PictFormat> {
        let (template, mask) = kind.template();
        self.find_format(mask, &template, 0)
    }
}
