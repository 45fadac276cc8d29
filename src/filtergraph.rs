//! Filter graphs handed to the media tool with `-filter_complex`.
//!
//! [`StackedClip`] stacks a source part over a background window;
//! [`grid_overlay`] composites still images on the cells of a grid.

use std::fmt::Write as _;
use std::path::Path;

use crate::grid::{GridSpec, LayoutResult};

/// Output width of a stacked clip.
pub const CLIP_WIDTH: u32 = 1080;
/// Height of the source video band.
pub const TOP_HEIGHT: u32 = 810;
/// Height of the background band.
pub const BOTTOM_HEIGHT: u32 = 1100;
/// Black gap under the source band.
pub const GAP: u32 = 10;
/// Seconds the part number stays on screen.
pub const PART_LABEL_SECS: u32 = 10;

/// Burnt-in subtitles for a stacked clip.
#[derive(Debug, Clone, Copy)]
pub struct Subtitles<'a> {
    pub path: &'a Path,
    /// ASS `force_style` override.
    pub style: &'a str,
}

/// One part of a source video stacked over background footage.
///
/// Input 0 is the background, input 1 the source.
#[derive(Debug, Clone, Copy)]
pub struct StackedClip<'a> {
    /// Zero-based part index.
    pub part: usize,
    pub part_duration: f64,
    pub overlap: f64,
    pub background_start: f64,
    pub subtitles: Option<Subtitles<'a>>,
}

impl StackedClip<'_> {
    pub fn source_start(&self) -> f64 {
        self.part as f64 * self.part_duration
    }

    /// Length of the rendered part, overlap included.
    pub fn window(&self) -> f64 {
        self.part_duration + self.overlap
    }

    pub fn filter(&self) -> String {
        let start = self.source_start();
        let window = self.window();
        let subtitles = self
            .subtitles
            .map(|s| format!("subtitles=filename={}:force_style='{}',", escape_filter_path(s.path), s.style))
            .unwrap_or_default();

        let mut graph = String::new();
        let _ = write!(
            graph,
            "[1:v]{subtitles}trim=start={start:.3}:duration={window:.3},setpts=PTS-STARTPTS,\
             crop=4*min(iw/4\\,ih/3):3*min(iw/4\\,ih/3),scale={w}:{top},pad=iw:ih+{gap}:0:0:black[top];",
            w = CLIP_WIDTH,
            top = TOP_HEIGHT,
            gap = GAP,
        );
        let _ = write!(
            graph,
            "[0:v]trim=start={bg:.3}:duration={window:.3},setpts=PTS-STARTPTS,\
             crop={w}*min(iw/{w}\\,ih/{h}):{h}*min(iw/{w}\\,ih/{h}),scale={w}:{h}[bottom];",
            bg = self.background_start,
            w = CLIP_WIDTH,
            h = BOTTOM_HEIGHT,
        );
        let _ = write!(
            graph,
            "[top][bottom]vstack=inputs=2:shortest=1,\
             drawtext=fontsize=180:fontcolor=white:x=80:y=750:text='{label}':enable='between(t,0,{secs})':\
             box=1:boxborderw=10:line_spacing=500:boxcolor=black[out];",
            label = self.part + 1,
            secs = PART_LABEL_SECS,
        );
        let _ = write!(
            graph,
            "[1:a]atrim=start={start:.3}:duration={window:.3},asetpts=PTS-STARTPTS[aout]"
        );
        graph
    }
}

/// Largest `(width, height)` with the same aspect ratio that fits in
/// `max_width` x `max_height`.
pub fn fit_within(width: u32, height: u32, max_width: u32, max_height: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (max_width, max_height);
    }
    let (w, h) = (width as u64, height as u64);
    let (mw, mh) = (max_width as u64, max_height as u64);
    let (fw, fh) = if w * mh <= h * mw {
        (w * mh / h, mh)
    } else {
        (mw, h * mw / w)
    };
    ((fw as u32).max(1), (fh as u32).max(1))
}

/// Grid composite of still images over a background.
///
/// Input 0 is the background, inputs 1..=n the images whose source sizes are
/// given in `sizes`. Each image is scaled to fit its cell and centered in it.
/// The final label is `[out]`.
pub fn grid_overlay(sizes: &[(u32, u32)], canvas_width: u32, canvas_height: u32) -> LayoutResult<String> {
    let spec = GridSpec::new(sizes.len(), canvas_width, canvas_height)?;
    let (cell_width, cell_height) = spec.cell_size();

    let mut graph = format!(
        "[0:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1[bg];",
        w = canvas_width,
        h = canvas_height
    );

    let mut previous = "bg".to_string();
    for (placement, &(width, height)) in spec.placements().iter().zip(sizes) {
        let i = placement.index;
        let (fw, fh) = fit_within(width, height, cell_width, cell_height);
        let x = placement.x + cell_width.saturating_sub(fw) / 2;
        let y = placement.y + cell_height.saturating_sub(fh) / 2;
        let label = if i + 1 == sizes.len() { "out".to_string() } else { format!("o{}", i) };

        let _ = write!(graph, "[{}:v]scale={}:{},setsar=1[i{}];", i + 1, fw, fh, i);
        let _ = write!(graph, "[{}][i{}]overlay=x={}:y={}[{}]", previous, i, x, y, label);
        if label != "out" {
            graph.push(';');
        }
        previous = label;
    }
    Ok(graph)
}

/// Escapes a path for use as a filter option value.
pub fn escape_filter_path(path: &Path) -> String {
    let raw = path.to_string_lossy();
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if matches!(ch, '\\' | '\'' | ':' | ',' | ';' | '[' | ']') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::LayoutError;

    #[test]
    fn test_stacked_clip_windows() {
        let clip = StackedClip {
            part: 2,
            part_duration: 80.0,
            overlap: 5.0,
            background_start: 12.5,
            subtitles: None,
        };
        let graph = clip.filter();
        assert!(graph.starts_with("[1:v]trim=start=160.000:duration=85.000,"));
        assert!(graph.contains("[0:v]trim=start=12.500:duration=85.000,"));
        assert!(graph.contains("text='3'"));
        assert!(graph.contains("crop=4*min(iw/4\\,ih/3)"));
        assert!(graph.ends_with("[1:a]atrim=start=160.000:duration=85.000,asetpts=PTS-STARTPTS[aout]"));
    }

    #[test]
    fn test_stacked_clip_subtitles_come_first() {
        let clip = StackedClip {
            part: 0,
            part_duration: 30.0,
            overlap: 0.0,
            background_start: 0.0,
            subtitles: Some(Subtitles {
                path: Path::new("tmp/abc.srt"),
                style: "Fontname=Consolas",
            }),
        };
        assert!(clip
            .filter()
            .starts_with("[1:v]subtitles=filename=tmp/abc.srt:force_style='Fontname=Consolas',trim=start=0.000"));
    }

    #[test]
    fn test_fit_within() {
        assert_eq!(fit_within(100, 50, 400, 800), (400, 200));
        assert_eq!(fit_within(50, 100, 400, 400), (200, 400));
        assert_eq!(fit_within(400, 800, 200, 400), (200, 400));
        assert_eq!(fit_within(0, 10, 20, 30), (20, 30));
    }

    #[test]
    fn test_grid_overlay_single_image() {
        let graph = grid_overlay(&[(100, 50)], 400, 800).unwrap();
        assert_eq!(
            graph,
            "[0:v]scale=400:800:force_original_aspect_ratio=increase,crop=400:800,setsar=1[bg];\
             [1:v]scale=400:200,setsar=1[i0];[bg][i0]overlay=x=0:y=300[out]"
        );
    }

    #[test]
    fn test_grid_overlay_centers_last_row() {
        let graph = grid_overlay(&[(200, 400), (200, 400), (200, 400)], 400, 800).unwrap();
        assert!(graph.contains("[bg][i0]overlay=x=0:y=0[o0];"));
        assert!(graph.contains("[o0][i1]overlay=x=200:y=0[o1];"));
        assert!(graph.ends_with("[o1][i2]overlay=x=100:y=400[out]"));
    }

    #[test]
    fn test_grid_overlay_rejects_too_many_images() {
        let sizes = vec![(10, 10); 10];
        assert_eq!(grid_overlay(&sizes, 400, 800), Err(LayoutError::UnsupportedItemCount(10)));
    }

    #[test]
    fn test_escape_filter_path() {
        assert_eq!(escape_filter_path(Path::new("C:/a b/it's.srt")), "C\\:/a b/it\\'s.srt");
    }
}
