//! Subtitle tracks: SRT from transcript segments, ASS with boxed captions.
//!
//! Captions are drawn as a rounded box (an ASS vector drawing on layer 0)
//! with the text centred on top of it (layer 1). Box size is estimated from
//! the font size and character count, since libass does not size boxes to
//! text by itself.

use std::fmt::Write as _;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{MediaError, MediaResult};

/// A timed piece of transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Start in seconds
    pub start: f64,
    /// End in seconds
    pub end: f64,
    pub text: String,
}

/// `HH:MM:SS,mmm`
pub fn format_srt_time(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let (h, rem) = (total_ms / 3_600_000, total_ms % 3_600_000);
    let (m, rem) = (rem / 60_000, rem % 60_000);
    let (s, ms) = (rem / 1000, rem % 1000);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// `H:MM:SS.cc`
pub fn format_ass_time(seconds: f64) -> String {
    let total_cs = (seconds.max(0.0) * 100.0).floor() as u64;
    let (h, rem) = (total_cs / 360_000, total_cs % 360_000);
    let (m, rem) = (rem / 6000, rem % 6000);
    let (s, cs) = (rem / 100, rem % 100);
    format!("{}:{:02}:{:02}.{:02}", h, m, s, cs)
}

/// Convert an SRT timestamp (`00:01:02,345`) to ASS (`0:01:02.34`).
pub fn srt_time_to_ass(srt_time: &str) -> MediaResult<String> {
    let invalid = || MediaError::InvalidTimestamp(srt_time.to_string());

    let (hms, ms) = srt_time.trim().split_once(',').ok_or_else(invalid)?;
    let mut parts = hms.split(':');
    let (Some(h), Some(m), Some(s), None) = (parts.next(), parts.next(), parts.next(), parts.next()) else {
        return Err(invalid());
    };

    let h: u32 = h.parse().map_err(|_| invalid())?;
    let m: u32 = m.parse().map_err(|_| invalid())?;
    let s: u32 = s.parse().map_err(|_| invalid())?;
    let ms: u32 = ms.parse().map_err(|_| invalid())?;
    if m >= 60 || s >= 60 || ms >= 1000 {
        return Err(invalid());
    }

    Ok(format!("{}:{:02}:{:02}.{:02}", h, m, s, ms / 10))
}

/// Greedy word wrap. A single word longer than `max_chars` gets its own line.
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        if current.is_empty() {
            current.push_str(word);
        } else if current.chars().count() + 1 + word.chars().count() > max_chars {
            lines.push(std::mem::take(&mut current));
            current.push_str(word);
        } else {
            current.push(' ');
            current.push_str(word);
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

/// Render segments as SRT, wrapping each caption at `max_chars`.
pub fn to_srt(segments: &[Segment], max_chars: usize) -> String {
    let mut out = String::new();
    for (i, segment) in segments.iter().filter(|s| !s.text.trim().is_empty()).enumerate() {
        let _ = writeln!(out, "{}", i + 1);
        let _ = writeln!(
            out,
            "{} --> {}",
            format_srt_time(segment.start),
            format_srt_time(segment.end)
        );
        let _ = writeln!(out, "{}\n", wrap_text(&segment.text, max_chars).join("\n"));
    }
    out
}

/// One caption ready for ASS: timestamps already in ASS form.
#[derive(Debug, Clone, PartialEq)]
pub struct Cue {
    pub start: String,
    pub end: String,
    pub lines: Vec<String>,
}

/// Parse SRT content. Blocks without a timing line are skipped.
pub fn parse_srt(content: &str) -> MediaResult<Vec<Cue>> {
    let normalized = content.replace("\r\n", "\n");
    let mut cues = Vec::new();

    for block in normalized.trim().split("\n\n") {
        let lines: Vec<&str> = block.trim().lines().collect();
        if lines.len() < 3 {
            continue;
        }
        let Some((start, end)) = lines[1].split_once("-->") else {
            continue;
        };
        cues.push(Cue {
            start: srt_time_to_ass(start)?,
            end: srt_time_to_ass(end)?,
            lines: lines[2..].iter().map(|l| l.trim().to_string()).collect(),
        });
    }
    Ok(cues)
}

/// Convert `#RRGGBB` plus opacity percent to ASS `&HAABBGGRR`.
pub fn hex_to_ass_color(hex: &str, opacity: u8) -> MediaResult<String> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(MediaError::invalid_subtitles(format!("invalid colour '{}'", hex)));
    }
    let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0);
    let (r, g, b) = (channel(0), channel(2), channel(4));
    let alpha = (100 - opacity.min(100) as u32) * 255 / 100;
    Ok(format!("&H{:02X}{:02X}{:02X}{:02X}", alpha, b, g, r))
}

/// Caption look and placement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubtitleStyle {
    pub font_family: String,
    pub font_size: u32,
    /// `#RRGGBB`
    pub font_color: String,
    /// `#RRGGBB`
    pub background_color: String,
    /// Box opacity in percent
    pub background_opacity: u8,
    pub corner_radius: u32,
    pub h_padding: u32,
    pub v_padding: u32,
    /// Average glyph width as a fraction of the font size
    pub char_width: f64,
    /// Numpad-style ASS alignment (1..=9)
    pub alignment: u8,
    pub margin_l: u32,
    pub margin_r: u32,
    pub margin_v: u32,
    /// Fixed vertical centre of the box; overrides `alignment` when set
    pub center_y: Option<u32>,
    /// Wrap width used when building captions from segments
    pub max_chars: usize,
    /// Lines per caption when building captions from segments
    pub max_lines: usize,
}

impl Default for SubtitleStyle {
    fn default() -> Self {
        Self {
            font_family: "Arial".to_string(),
            font_size: 48,
            font_color: "#FFFFFF".to_string(),
            background_color: "#000000".to_string(),
            background_opacity: 80,
            corner_radius: 20,
            h_padding: 25,
            v_padding: 15,
            char_width: 0.6,
            alignment: 5,
            margin_l: 40,
            margin_r: 40,
            margin_v: 40,
            center_y: None,
            max_chars: 50,
            max_lines: 2,
        }
    }
}

impl SubtitleStyle {
    /// Large centred captions for portrait shorts.
    pub fn shorts() -> Self {
        Self {
            font_size: 70,
            background_opacity: 100,
            corner_radius: 40,
            h_padding: 45,
            v_padding: 45,
            char_width: 0.5,
            margin_l: 20,
            margin_r: 20,
            margin_v: 20,
            center_y: Some(1150),
            max_chars: 22,
            max_lines: 3,
            ..Self::default()
        }
    }

    /// Look up a built-in style by name.
    pub fn named(name: &str) -> Option<Self> {
        match name {
            "default" | "box" => Some(Self::default()),
            "shorts" => Some(Self::shorts()),
            _ => None,
        }
    }

    fn style_line(&self) -> MediaResult<String> {
        let fc = hex_to_ass_color(&self.font_color, 100)?;
        let bc = hex_to_ass_color(&self.background_color, self.background_opacity)?;
        Ok(format!(
            "Style: Default,{},{},{fc},{fc},{bc},{bc},-1,0,0,0,100,100,0,0,1,0,0,{},{},{},{},1",
            self.font_family,
            self.font_size,
            self.alignment,
            self.margin_l,
            self.margin_r,
            self.margin_v,
        ))
    }
}

/// Caption box in script pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CaptionBox {
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
}

impl CaptionBox {
    fn center(&self) -> (i64, i64) {
        ((self.x1 + self.x2) / 2, (self.y1 + self.y2) / 2)
    }

    /// Rounded rectangle as an ASS drawing.
    fn drawing(&self, r: i64) -> String {
        let CaptionBox { x1, y1, x2, y2 } = *self;
        format!(
            "m {} {} l {} {} b {x2} {y1} {x2} {y1} {x2} {} \
             l {x2} {} b {x2} {y2} {x2} {y2} {} {y2} \
             l {} {y2} b {x1} {y2} {x1} {y2} {x1} {} \
             l {x1} {} b {x1} {y1} {x1} {y1} {} {y1}",
            x1 + r,
            y1,
            x2 - r,
            y1,
            y1 + r,
            y2 - r,
            x2 - r,
            x1 + r,
            y2 - r,
            y1 + r,
            x1 + r,
        )
    }
}

/// An ASS script for one render resolution.
#[derive(Debug, Clone)]
pub struct AssDocument {
    width: u32,
    height: u32,
    style: SubtitleStyle,
    events: Vec<String>,
}

impl AssDocument {
    pub fn new(width: u32, height: u32, style: SubtitleStyle) -> Self {
        Self {
            width,
            height,
            style,
            events: Vec::new(),
        }
    }

    /// Build from SRT content.
    pub fn from_srt(srt: &str, width: u32, height: u32, style: SubtitleStyle) -> MediaResult<Self> {
        let mut doc = Self::new(width, height, style);
        for cue in parse_srt(srt)? {
            doc.push_cue(&cue);
        }
        Ok(doc)
    }

    /// Build from transcript segments, wrapping and chunking each segment
    /// into captions of at most `max_lines` lines.
    pub fn from_segments(segments: &[Segment], width: u32, height: u32, style: SubtitleStyle) -> Self {
        let mut doc = Self::new(width, height, style);
        let max_chars = doc.style.max_chars.max(1);
        let max_lines = doc.style.max_lines.max(1);

        for segment in segments {
            let lines = wrap_text(&segment.text, max_chars);
            if lines.is_empty() {
                continue;
            }

            // Split the segment's time across chunks by character count.
            let total_chars: usize = lines.iter().map(|l| l.chars().count()).sum::<usize>().max(1);
            let span = (segment.end - segment.start).max(0.0);
            let mut cursor = segment.start;

            for chunk in lines.chunks(max_lines) {
                let chars: usize = chunk.iter().map(|l| l.chars().count()).sum();
                let end = (cursor + span * chars as f64 / total_chars as f64).min(segment.end);
                doc.push_cue(&Cue {
                    start: format_ass_time(cursor),
                    end: format_ass_time(end),
                    lines: chunk.to_vec(),
                });
                cursor = end;
            }
        }
        doc
    }

    fn caption_box(&self, lines: &[String]) -> CaptionBox {
        let style = &self.style;
        let font = style.font_size as f64;
        let longest = lines.iter().map(|l| l.chars().count()).max().unwrap_or(1) as f64;

        let text_w = (longest * font * style.char_width) as i64;
        let text_h = (lines.len() as f64 * font * 1.2) as i64;
        let box_w = text_w + 2 * style.h_padding as i64;
        let box_h = text_h + 2 * style.v_padding as i64;
        let (res_x, res_y) = (self.width as i64, self.height as i64);

        let (x1, y1) = match style.center_y {
            Some(cy) => (res_x / 2 - box_w / 2, cy as i64 - box_h / 2),
            None => {
                let alignment = style.alignment.clamp(1, 9) as i64;
                let x1 = match (alignment - 1) % 3 {
                    0 => style.margin_l as i64,
                    1 => (res_x - box_w) / 2,
                    _ => res_x - style.margin_r as i64 - box_w,
                };
                let y1 = match (alignment - 1) / 3 {
                    0 => res_y - style.margin_v as i64 - box_h,
                    1 => (res_y - box_h) / 2,
                    _ => style.margin_v as i64,
                };
                (x1, y1)
            }
        };

        CaptionBox {
            x1,
            y1,
            x2: x1 + box_w,
            y2: y1 + box_h,
        }
    }

    /// Add one boxed caption.
    pub fn push_cue(&mut self, cue: &Cue) {
        if cue.lines.is_empty() {
            return;
        }
        let caption = self.caption_box(&cue.lines);
        let (cx, cy) = caption.center();

        let back = hex_to_ass_color(&self.style.background_color, self.style.background_opacity)
            .unwrap_or_else(|_| "&H33000000".to_string());
        let (box_alpha, box_color) = (&back[2..4], &back[4..]);
        let radius = self.style.corner_radius as i64;

        self.events.push(format!(
            "Dialogue: 0,{},{},Default,,0,0,0,,{{\\p1\\an7\\pos(0,0)\\1c&H{}&\\1a&H{}&\\3a&HFF&\\bord0\\shad0}}{}{{\\p0}}",
            cue.start,
            cue.end,
            box_color,
            box_alpha,
            caption.drawing(radius)
        ));
        self.events.push(format!(
            "Dialogue: 1,{},{},Default,,0,0,0,,{{\\an5\\pos({},{})\\bord0\\shad0\\3a&HFF&}}{}",
            cue.start,
            cue.end,
            cx,
            cy,
            cue.lines.join("\\N")
        ));
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn render(&self) -> MediaResult<String> {
        let mut out = String::new();
        let _ = write!(
            out,
            "[Script Info]\nScriptType: v4.00+\nPlayResX: {}\nPlayResY: {}\nWrapStyle: 2\n\n",
            self.width, self.height
        );
        out.push_str("[V4+ Styles]\n");
        out.push_str(
            "Format: Name,Fontname,Fontsize,PrimaryColour,SecondaryColour,OutlineColour,BackColour,\
             Bold,Italic,Underline,StrikeOut,ScaleX,ScaleY,Spacing,Angle,BorderStyle,Outline,Shadow,\
             Alignment,MarginL,MarginR,MarginV,Encoding\n",
        );
        out.push_str(&self.style.style_line()?);
        out.push_str("\n\n[Events]\n");
        out.push_str("Format: Layer, Start, End, Style, Name, MarginL, MarginR, MarginV, Effect, Text\n");
        for event in &self.events {
            out.push_str(event);
            out.push('\n');
        }
        Ok(out)
    }

    pub async fn write_to(&self, path: &Path) -> MediaResult<()> {
        tokio::fs::write(path, self.render()?).await?;
        Ok(())
    }
}

/// Escape a path for use inside `subtitles='...'`.
pub fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "/")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// `subtitles=` filter for an ASS file.
pub fn subtitles_filter(path: &Path) -> String {
    format!("subtitles='{}'", escape_filter_path(path))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_srt_to_ass_time() {
        assert_eq!(srt_time_to_ass("00:01:02,345").unwrap(), "0:01:02.34");
        assert_eq!(srt_time_to_ass(" 01:00:00,009 ").unwrap(), "1:00:00.00");
        assert!(srt_time_to_ass("00:01:02.345").is_err());
        assert!(srt_time_to_ass("00:61:02,345").is_err());
    }

    #[test]
    fn test_time_formatting() {
        assert_eq!(format_srt_time(62.345), "00:01:02,345");
        assert_eq!(format_srt_time(3600.0), "01:00:00,000");
        assert_eq!(format_ass_time(62.345), "0:01:02.34");
    }

    #[test]
    fn test_wrap_text() {
        let lines = wrap_text("the quick brown fox jumps over the lazy dog", 15);
        assert_eq!(lines, vec!["the quick brown", "fox jumps over", "the lazy dog"]);
        assert!(lines.iter().all(|l| l.len() <= 15));

        assert_eq!(wrap_text("supercalifragilistic ok", 5), vec!["supercalifragilistic", "ok"]);
        assert!(wrap_text("   ", 10).is_empty());
    }

    #[test]
    fn test_srt_roundtrip_into_cues() {
        let segments = vec![
            Segment { start: 0.0, end: 2.5, text: " Hello there. ".into() },
            Segment { start: 2.5, end: 4.0, text: "".into() },
            Segment { start: 4.0, end: 6.0, text: "General Kenobi".into() },
        ];
        let srt = to_srt(&segments, 50);
        assert!(srt.starts_with("1\n00:00:00,000 --> 00:00:02,500\nHello there.\n\n"));

        let cues = parse_srt(&srt).unwrap();
        assert_eq!(cues.len(), 2);
        assert_eq!(cues[1].start, "0:00:04.00");
        assert_eq!(cues[1].lines, vec!["General Kenobi"]);
    }

    #[test]
    fn test_hex_to_ass_color() {
        assert_eq!(hex_to_ass_color("#FFFFFF", 100).unwrap(), "&H00FFFFFF");
        assert_eq!(hex_to_ass_color("#102030", 80).unwrap(), "&H33302010");
        assert!(hex_to_ass_color("#12345", 100).is_err());
    }

    #[test]
    fn test_ass_document_has_box_and_text_layers() {
        let srt = "1\n00:00:01,000 --> 00:00:03,500\nfirst line\nsecond\n\n";
        let doc = AssDocument::from_srt(srt, 1920, 1080, SubtitleStyle::default()).unwrap();
        assert_eq!(doc.event_count(), 2);

        let ass = doc.render().unwrap();
        assert!(ass.contains("PlayResX: 1920"));
        assert!(ass.contains("Style: Default,Arial,48,&H00FFFFFF"));
        assert!(ass.contains("Dialogue: 0,0:00:01.00,0:00:03.50,Default,,0,0,0,,{\\p1"));
        assert!(ass.contains("first line\\Nsecond"));
    }

    #[test]
    fn test_centered_box_position() {
        let doc = AssDocument::new(1920, 1080, SubtitleStyle::default());
        let caption = doc.caption_box(&["0123456789".to_string()]);
        // 10 chars * 48 * 0.6 = 288 wide text, plus 2*25 padding.
        assert_eq!(caption.x2 - caption.x1, 338);
        assert_eq!(caption.center().0, 960);
        assert!((caption.center().1 - 540).abs() <= 1);
    }

    #[test]
    fn test_shorts_chunks_long_segments() {
        let segments = vec![Segment {
            start: 0.0,
            end: 8.0,
            text: "one two three four five six seven eight nine ten eleven twelve thirteen fourteen".into(),
        }];
        let doc = AssDocument::from_segments(&segments, 1080, 1920, SubtitleStyle::shorts());
        // Four 22-char lines at three lines per caption: two captions, two events each.
        assert_eq!(doc.event_count(), 4);
        let ass = doc.render().unwrap();
        assert!(ass.contains("\\pos(540,1150)"));
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(
            escape_filter_path(Path::new("C:\\work\\it's.ass")),
            "C\\:/work/it\\'s.ass"
        );
        assert_eq!(subtitles_filter(Path::new("/tmp/a.ass")), "subtitles='/tmp/a.ass'");
    }
}
