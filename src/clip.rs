//! Splitting a source video into parts stacked over background footage.

use anyhow::{anyhow, Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use rayon::prelude::*;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::filtergraph::{StackedClip, Subtitles};
use crate::media::{quality_args, MediaTool};
use crate::records::ClipRecord;
use crate::{AppConfig, Progress};

/// Extensions accepted as background footage.
pub const VIDEO_EXTENSIONS: &[&str] = &["mov", "mp4", "avi", "mkv", "webm"];

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.iter().any(|v| ext.eq_ignore_ascii_case(v)))
}

/// Video files directly inside `dir`, sorted.
pub fn list_backgrounds(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(anyhow!("Backgrounds directory does not exist: {}", dir.display()));
    }
    let mut backgrounds: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && is_video(p))
        .collect();
    backgrounds.sort();

    if backgrounds.is_empty() {
        return Err(anyhow!("No background videos found in {}", dir.display()));
    }
    Ok(backgrounds)
}

/// Returns `(count, part_duration)` so that each part plus `overlap` stays
/// within `length` seconds.
pub fn plan_parts(duration: f64, length: f64, overlap: f64) -> Result<(usize, f64)> {
    if duration.is_nan() || duration <= 0.0 {
        return Err(anyhow!("source duration must be positive, got {}", duration));
    }
    if length <= overlap || overlap < 0.0 {
        return Err(anyhow!("clip length {} must exceed overlap {}", length, overlap));
    }
    let count = (duration / (length - overlap)).ceil() as usize;
    Ok((count, duration / count as f64))
}

/// Random start in the background so that a window of
/// `part_duration + overlap` seconds fits. Short backgrounds start at 0.
pub fn background_window<R: Rng + ?Sized>(bg_duration: f64, part_duration: f64, overlap: f64, rng: &mut R) -> f64 {
    let range = bg_duration - (part_duration + overlap);
    if range > 0.0 {
        rng.gen::<f64>() * range
    } else {
        0.0
    }
}

pub fn part_description(part: usize, count: usize, title: &str) -> String {
    format!("Part {}/{} of {}", part, count, title)
}

pub fn part_file_name(id: &str, index: usize) -> String {
    format!("{}+{}.mp4", id, index)
}

/// One source video to split.
#[derive(Debug, Clone)]
pub struct ClipJob {
    pub id: String,
    pub title: String,
    pub source: PathBuf,
    pub backgrounds: Vec<PathBuf>,
    pub output_dir: PathBuf,
    /// SRT file burnt into the source band.
    pub subtitles: Option<PathBuf>,
    pub config: AppConfig,
}

/// A part ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct PartPlan {
    /// Zero-based part index.
    pub index: usize,
    pub count: usize,
    pub part_duration: f64,
    pub background: PathBuf,
    pub background_start: f64,
    pub output: PathBuf,
}

impl ClipJob {
    /// Probes the source and chosen backgrounds and picks a background window
    /// for every part.
    pub fn plan<R: Rng + ?Sized>(&self, tool: &MediaTool, rng: &mut R) -> Result<Vec<PartPlan>> {
        let duration = tool.probe_duration(&self.source)?;
        info!(id = %self.id, duration, "probed source");
        self.plan_with(duration, |bg| tool.probe_duration(bg), rng)
    }

    /// Like [`plan`](Self::plan) with the source duration known and a custom
    /// background probe.
    pub fn plan_with<R, P>(&self, source_duration: f64, mut probe: P, rng: &mut R) -> Result<Vec<PartPlan>>
    where
        R: Rng + ?Sized,
        P: FnMut(&Path) -> Result<f64>,
    {
        let (count, part_duration) = plan_parts(source_duration, self.config.clip_length, self.config.overlap)?;
        let mut durations: HashMap<PathBuf, f64> = HashMap::new();

        (0..count)
            .map(|index| -> Result<PartPlan> {
                let background = self
                    .backgrounds
                    .choose(&mut *rng)
                    .ok_or_else(|| anyhow!("no backgrounds to choose from"))?
                    .clone();
                let bg_duration = match durations.get(&background) {
                    Some(d) => *d,
                    None => {
                        let d = probe(&background)?;
                        durations.insert(background.clone(), d);
                        d
                    }
                };
                let background_start = background_window(bg_duration, part_duration, self.config.overlap, &mut *rng);
                Ok(PartPlan {
                    index,
                    count,
                    part_duration,
                    background,
                    background_start,
                    output: self.output_dir.join(part_file_name(&self.id, index)),
                })
            })
            .collect()
    }

    /// Media tool arguments for one part, output path excluded.
    pub fn render_args(&self, part: &PartPlan) -> Vec<String> {
        let clip = StackedClip {
            part: part.index,
            part_duration: part.part_duration,
            overlap: self.config.overlap,
            background_start: part.background_start,
            subtitles: self.subtitles.as_deref().map(|path| Subtitles {
                path,
                style: &self.config.subtitle_style,
            }),
        };

        let mut args: Vec<String> = vec![
            "-stream_loop".into(),
            "-1".into(),
            "-i".into(),
            part.background.to_string_lossy().into_owned(),
            "-i".into(),
            self.source.to_string_lossy().into_owned(),
            "-filter_complex".into(),
            clip.filter(),
            "-map".into(),
            "[out]".into(),
            "-map".into(),
            "[aout]".into(),
        ];
        args.extend(quality_args(&self.config.quality));
        args
    }

    pub fn record(&self, part: &PartPlan) -> ClipRecord {
        ClipRecord {
            id: self.id.clone(),
            title: self.title.clone(),
            description: part_description(part.index + 1, part.count, &self.title),
            part: part.index + 1,
            file_path: part.output.to_string_lossy().into_owned(),
            uploaded: false,
        }
    }
}

/// Renders every planned part in parallel, returning records in part order.
pub fn render_parts<F>(tool: &MediaTool, job: &ClipJob, plan: &[PartPlan], progress_callback: F) -> Result<Vec<ClipRecord>>
where
    F: Fn(Progress) + Send + Sync,
{
    fs::create_dir_all(&job.output_dir).with_context(|| format!("creating output directory {}", job.output_dir.display()))?;

    let total = plan.len();
    let completed = AtomicUsize::new(0);
    progress_callback(Progress::rendering_parts(0, total));

    let records = plan
        .par_iter()
        .map(|part| -> Result<ClipRecord> {
            debug!(part = part.index + 1, total, background = %part.background.display(), "rendering part");
            tool.render(&job.render_args(part), &part.output)
                .with_context(|| format!("rendering part {} of {}", part.index + 1, job.id))?;

            let current = completed.fetch_add(1, Ordering::SeqCst) + 1;
            progress_callback(Progress::rendering_parts(current, total));
            Ok(job.record(part))
        })
        .collect::<Result<Vec<_>>>()?;

    progress_callback(Progress::complete(total));
    Ok(records)
}

/// Plans and renders a job end to end.
pub fn run<R, F>(tool: &MediaTool, job: &ClipJob, rng: &mut R, progress_callback: F) -> Result<Vec<ClipRecord>>
where
    R: Rng + ?Sized,
    F: Fn(Progress) + Send + Sync,
{
    progress_callback(Progress::probing_media());
    let plan = job.plan(tool, rng)?;
    info!(id = %job.id, parts = plan.len(), "planned parts");
    render_parts(tool, job, &plan, progress_callback)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn job(backgrounds: Vec<PathBuf>) -> ClipJob {
        ClipJob {
            id: "abc".into(),
            title: "A Talk".into(),
            source: PathBuf::from("src/abc.mp4"),
            backgrounds,
            output_dir: PathBuf::from("out"),
            subtitles: None,
            config: AppConfig::default(),
        }
    }

    #[test]
    fn test_plan_parts() {
        let (count, part) = plan_parts(170.0, 90.0, 5.0).unwrap();
        assert_eq!(count, 2);
        assert_eq!(part, 85.0);

        let (count, part) = plan_parts(171.0, 90.0, 5.0).unwrap();
        assert_eq!(count, 3);
        assert_eq!(part, 57.0);

        assert_eq!(plan_parts(10.0, 90.0, 5.0).unwrap().0, 1);
        assert!(plan_parts(0.0, 90.0, 5.0).is_err());
        assert!(plan_parts(10.0, 5.0, 5.0).is_err());
    }

    #[test]
    fn test_background_window_fits() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..100 {
            let start = background_window(300.0, 80.0, 5.0, &mut rng);
            assert!((0.0..=215.0).contains(&start));
        }
        assert_eq!(background_window(60.0, 80.0, 5.0, &mut rng), 0.0);
    }

    #[test]
    fn test_plan_with_probes_each_background_once() {
        let job = job(vec![PathBuf::from("bg/a.mp4"), PathBuf::from("bg/b.mp4")]);
        let mut rng = StdRng::seed_from_u64(1);
        let mut probes = Vec::new();
        let plan = job
            .plan_with(
                400.0,
                |bg| {
                    probes.push(bg.to_path_buf());
                    Ok(600.0)
                },
                &mut rng,
            )
            .unwrap();

        assert_eq!(plan.len(), 5);
        assert_eq!(plan[4].output, PathBuf::from("out/abc+4.mp4"));
        assert!(plan.iter().all(|p| p.count == 5 && p.part_duration == 80.0));
        assert!(plan.iter().all(|p| p.background_start <= 600.0 - 85.0));
        probes.sort();
        probes.dedup();
        assert!(probes.len() <= 2);
    }

    #[test]
    fn test_plan_without_backgrounds_fails() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(job(Vec::new()).plan_with(100.0, |_| Ok(100.0), &mut rng).is_err());
    }

    #[test]
    fn test_render_args_and_record() {
        let job = job(vec![PathBuf::from("bg/a.mp4")]);
        let part = PartPlan {
            index: 1,
            count: 3,
            part_duration: 60.0,
            background: PathBuf::from("bg/a.mp4"),
            background_start: 4.0,
            output: PathBuf::from("out/abc+1.mp4"),
        };
        let args = job.render_args(&part);
        assert_eq!(&args[..6], &["-stream_loop", "-1", "-i", "bg/a.mp4", "-i", "src/abc.mp4"]);
        assert_eq!(args[6], "-filter_complex");
        assert!(args[7].contains("trim=start=60.000:duration=65.000"));
        assert!(args.ends_with(&["-preset".to_string(), "ultrafast".to_string()]));

        let record = job.record(&part);
        assert_eq!(record.part, 2);
        assert_eq!(record.description, "Part 2/3 of A Talk");
        assert_eq!(record.file_path, "out/abc+1.mp4");
        assert!(!record.uploaded);
    }

    #[test]
    fn test_list_backgrounds() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.MP4", "a.webm", "notes.txt"] {
            fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = list_backgrounds(dir.path()).unwrap();
        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.webm", "b.MP4"]);

        let empty = tempfile::tempdir().unwrap();
        assert!(list_backgrounds(empty.path()).is_err());
    }
}
