//! Caption style → libass `force_style` translation.
//!
//! The subtitles filter takes style overrides as a comma separated list of
//! `Key=Value` pairs using ASS style field names. Colours in that vocabulary
//! are `&HAABBGGRR`: blue first, red last, with a leading alpha byte where
//! `00` means fully opaque.

use crate::error::{CoreError, Result};
use crate::types::{CaptionPosition, CaptionStyle, FontWeight};

/// Outline colour, outline width and shadow depth are always emitted so
/// captions stay readable over any footage.
pub const OUTLINE_COLOUR: &str = "&H00000000";
pub const OUTLINE_WIDTH: u32 = 2;
pub const SHADOW_DEPTH: u32 = 1;

/// Vertical margin (pixels) for captions pinned to the top or bottom edge.
pub const EDGE_MARGIN_V: u32 = 60;

/// Translate a caption style into a `force_style` string.
pub fn translate(style: &CaptionStyle) -> Result<String> {
    if style.size_pt == 0 {
        return Err(CoreError::InvalidStyle("font size must be positive".into()));
    }
    let font = primary_font_family(&style.font_family)?;
    let colour = hex_to_ass_color(&style.color_hex)?;
    let (alignment, margin_v) = alignment_for(style.position);

    let mut fields: Vec<(&str, String)> = vec![
        ("FontName", font.to_string()),
        ("FontSize", style.size_pt.to_string()),
        ("PrimaryColour", colour),
        ("OutlineColour", OUTLINE_COLOUR.to_string()),
        ("Outline", OUTLINE_WIDTH.to_string()),
        ("Shadow", SHADOW_DEPTH.to_string()),
    ];

    match style.weight {
        FontWeight::Bold => fields.push(("Bold", "1".to_string())),
        FontWeight::Minimal => fields.push(("Bold", "0".to_string())),
        FontWeight::Default => {}
    }

    fields.push(("Alignment", alignment.to_string()));
    fields.push(("MarginV", margin_v.to_string()));

    Ok(fields
        .into_iter()
        .map(|(key, value)| format!("{key}={value}"))
        .collect::<Vec<_>>()
        .join(","))
}

/// ASS numpad alignment and vertical margin for a caption position.
///
/// Uses the horizontally centered column of the 3x3 grid: 8 (top),
/// 5 (middle), 2 (bottom).
pub fn alignment_for(position: CaptionPosition) -> (u32, u32) {
    match position {
        CaptionPosition::Top => (8, EDGE_MARGIN_V),
        CaptionPosition::Center => (5, 0),
        CaptionPosition::Bottom => (2, EDGE_MARGIN_V),
    }
}

/// First family of a CSS-like fallback list: `"Inter", Arial, sans-serif` → `Inter`.
pub fn primary_font_family(family: &str) -> Result<&str> {
    let first = family
        .split(',')
        .next()
        .unwrap_or_default()
        .trim()
        .trim_matches(|c| c == '"' || c == '\'')
        .trim();

    if first.is_empty() {
        return Err(CoreError::InvalidStyle(format!(
            "font family {family:?} is empty"
        )));
    }
    // The style string is quoted and colon-delimited inside the filter graph.
    if first.contains(['\'', ':', '=', '[', ']', ';']) {
        return Err(CoreError::InvalidStyle(format!(
            "font family {first:?} contains reserved characters"
        )));
    }
    Ok(first)
}

/// `#RRGGBB` → `&H00BBGGRR`.
pub fn hex_to_ass_color(hex: &str) -> Result<String> {
    let (r, g, b) = parse_hex_rgb(hex)?;
    Ok(format!("&H00{b:02X}{g:02X}{r:02X}"))
}

/// `&HAABBGGRR` → `#RRGGBB`. The alpha byte is dropped.
pub fn ass_color_to_hex(ass: &str) -> Result<String> {
    let digits = ass
        .strip_prefix("&H")
        .or_else(|| ass.strip_prefix("&h"))
        .map(|d| d.trim_end_matches('&'))
        .ok_or_else(|| CoreError::InvalidStyle(format!("{ass:?} is not an &H colour")))?;

    if digits.len() != 8 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(CoreError::InvalidStyle(format!(
            "{ass:?} is not an &HAABBGGRR colour"
        )));
    }

    let byte = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16);
    let (b, g, r) = match (byte(2), byte(4), byte(6)) {
        (Ok(b), Ok(g), Ok(r)) => (b, g, r),
        _ => {
            return Err(CoreError::InvalidStyle(format!(
                "{ass:?} is not an &HAABBGGRR colour"
            )))
        }
    };
    Ok(format!("#{r:02X}{g:02X}{b:02X}"))
}

fn parse_hex_rgb(hex: &str) -> Result<(u8, u8, u8)> {
    let invalid = || CoreError::InvalidStyle(format!("colour {hex:?} is not #RRGGBB"));

    let digits = hex.trim().strip_prefix('#').ok_or_else(invalid)?;
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(invalid());
    }

    let r = u8::from_str_radix(&digits[0..2], 16).map_err(|_| invalid())?;
    let g = u8::from_str_radix(&digits[2..4], 16).map_err(|_| invalid())?;
    let b = u8::from_str_radix(&digits[4..6], 16).map_err(|_| invalid())?;
    Ok((r, g, b))
}
