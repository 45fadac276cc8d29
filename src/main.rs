use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use dialoguer::Confirm;
use indicatif::{ProgressBar, ProgressStyle};
use rand::seq::SliceRandom;
use reclip::clip::{self, ClipJob};
use reclip::filtergraph::grid_overlay;
use reclip::grid::GridSpec;
use reclip::media::{quality_args, MediaTool, TempFileGuard};
use reclip::records::{self, ClipRecord, PostRecord, RecordLog};
use reclip::reddit::{self, RedditClient, LISTING_KINDS};
use reclip::{captions, logging, AppConfig, ProgressPhase};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use walkdir::WalkDir;

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert a timed-text transcript (XML) into SRT captions
    Captions {
        /// Transcript XML file
        transcript: PathBuf,

        /// Output SRT file (stdout when omitted)
        #[arg(long, short)]
        out: Option<PathBuf>,

        /// Maximum characters per caption
        #[arg(long)]
        max_len: Option<usize>,
    },

    /// Print grid placements for a number of items
    Layout {
        /// Number of items (1 to 9)
        count: usize,

        /// Canvas width in pixels
        #[arg(long)]
        width: Option<u32>,

        /// Canvas height in pixels
        #[arg(long)]
        height: Option<u32>,
    },

    /// Split a source video into parts stacked over background footage
    Clip {
        /// Source video file
        source: PathBuf,

        /// Directory of background videos
        #[arg(long, short)]
        backgrounds: PathBuf,

        /// Output directory for the parts
        #[arg(long, short)]
        out: PathBuf,

        /// Transcript XML to burn in as captions
        #[arg(long)]
        transcript: Option<PathBuf>,

        /// Identifier used in part file names (defaults to the source file stem)
        #[arg(long)]
        id: Option<String>,

        /// Title used in part descriptions (defaults to the identifier)
        #[arg(long)]
        title: Option<String>,

        /// Clip log to append to
        #[arg(long, default_value = "clips.jsonl")]
        log: PathBuf,

        /// Clear existing clips in the output directory without asking
        #[arg(long, short, default_value_t = false)]
        yes: bool,
    },

    /// Composite up to nine images in a grid over a background
    Meme {
        /// Image files, laid out left to right, top to bottom
        #[arg(required = true, num_args = 1..=9)]
        images: Vec<PathBuf>,

        /// Background video or image
        #[arg(long, short)]
        background: PathBuf,

        /// Output video file
        #[arg(long, short)]
        out: PathBuf,

        /// Length of the output in seconds
        #[arg(long, default_value_t = 30.0)]
        duration: f64,
    },

    /// Download image posts from subreddits
    Fetch {
        /// Subreddit names
        #[arg(required = true)]
        subreddits: Vec<String>,

        /// Download directory
        #[arg(long, short)]
        out: PathBuf,

        /// Posts requested per listing
        #[arg(long, default_value_t = 25)]
        limit: usize,

        /// Images downloaded per subreddit and listing
        #[arg(long, default_value_t = 5)]
        per_category: usize,

        /// Post log to append to
        #[arg(long, default_value = "posts.jsonl")]
        log: PathBuf,
    },

    /// List clips that have not been uploaded yet
    Pending {
        #[arg(long, default_value = "clips.jsonl")]
        log: PathBuf,
    },

    /// Record a clip as uploaded
    MarkUploaded {
        /// File path of the clip as written in the log
        file_path: String,

        #[arg(long, default_value = "clips.jsonl")]
        log: PathBuf,
    },
}

#[derive(Parser, Debug)]
#[command(version, about = "Turn long videos and image posts into short vertical clips.")]
struct Args {
    #[command(subcommand)]
    cmd: Command,

    /// Config file (defaults to reclip.json in the app data dir, then the current dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug details to stderr
    #[arg(long, short, global = true, default_value_t = false)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init_tracing(args.verbose);

    let cfg = AppConfig::load(args.config.as_deref())?;
    let tool = MediaTool::new(cfg.ffmpeg.clone());

    match args.cmd {
        Command::Captions { transcript, out, max_len } => run_captions(&cfg, &transcript, out.as_deref(), max_len),
        Command::Layout { count, width, height } => {
            run_layout(count, width.unwrap_or(cfg.canvas_width), height.unwrap_or(cfg.canvas_height))
        }
        Command::Clip {
            source,
            backgrounds,
            out,
            transcript,
            id,
            title,
            log,
            yes,
        } => {
            let id = match id {
                Some(id) => id,
                None => source
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("Cannot derive an id from {}", source.display()))?,
            };
            let title = title.unwrap_or_else(|| id.clone());
            let job = ClipJob {
                id,
                title,
                source,
                backgrounds: clip::list_backgrounds(&backgrounds)?,
                output_dir: out,
                subtitles: None,
                config: cfg.clone(),
            };
            run_clip(&tool, job, transcript.as_deref(), &log, yes)
        }
        Command::Meme {
            images,
            background,
            out,
            duration,
        } => run_meme(&cfg, &tool, &images, &background, &out, duration),
        Command::Fetch {
            subreddits,
            out,
            limit,
            per_category,
            log,
        } => run_fetch(&cfg, &subreddits, &out, limit, per_category, &log),
        Command::Pending { log } => {
            let pending = records::pending(&RecordLog::new(log))?;
            if pending.is_empty() {
                println!("Nothing left to upload.");
            }
            for clip in pending {
                println!("{}\t{}", clip.file_path, clip.description);
            }
            Ok(())
        }
        Command::MarkUploaded { file_path, log } => {
            let record = records::mark_uploaded(&RecordLog::new(log), &file_path)?;
            println!("Marked {} as uploaded", record.file_path);
            Ok(())
        }
    }
}

fn run_captions(cfg: &AppConfig, transcript: &Path, out: Option<&Path>, max_len: Option<usize>) -> Result<()> {
    let xml = fs::read_to_string(transcript).with_context(|| format!("reading {}", transcript.display()))?;
    let srt = captions::xml_to_srt(&xml, max_len.unwrap_or(cfg.caption_max_len))
        .with_context(|| format!("converting {}", transcript.display()))?;

    match out {
        Some(path) => {
            fs::write(path, &srt).with_context(|| format!("writing {}", path.display()))?;
            println!("Captions written to {}", path.display());
        }
        None => print!("{}", srt),
    }
    Ok(())
}

fn run_layout(count: usize, width: u32, height: u32) -> Result<()> {
    let spec = GridSpec::new(count, width, height)?;
    let (cell_width, cell_height) = spec.cell_size();
    println!(
        "{}x{} grid on {}x{}, cells {}x{}",
        spec.rows(),
        spec.columns(),
        width,
        height,
        cell_width,
        cell_height
    );
    for p in spec.placements() {
        println!("{}: ({}, {})", p.index, p.x, p.y);
    }
    Ok(())
}

/// Asks before removing previously rendered clips. Returns false when the
/// user declines.
fn prepare_output_dir(dir: &Path, assume_yes: bool) -> Result<bool> {
    fs::create_dir_all(dir).with_context(|| format!("creating output dir {}", dir.display()))?;

    let existing: Vec<PathBuf> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .map(|e| e.into_path())
        .filter(|p| p.is_file() && clip::is_video(p))
        .collect();
    if existing.is_empty() {
        return Ok(true);
    }

    if !assume_yes
        && !Confirm::new()
            .with_prompt(format!(
                "Output directory {} already contains {} clips. Overwrite?",
                dir.display(),
                existing.len()
            ))
            .default(false)
            .interact()?
    {
        return Ok(false);
    }

    for path in existing {
        fs::remove_file(&path).with_context(|| format!("removing {}", path.display()))?;
    }
    Ok(true)
}

fn run_clip(tool: &MediaTool, mut job: ClipJob, transcript: Option<&Path>, log: &Path, yes: bool) -> Result<()> {
    if !job.source.is_file() {
        return Err(anyhow!("Source video does not exist: {}", job.source.display()));
    }
    if !prepare_output_dir(&job.output_dir, yes)? {
        println!("Operation cancelled.");
        return Ok(());
    }

    // Kept alive until every part is rendered.
    let captions_file = match transcript {
        Some(path) => {
            let xml = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            let srt = captions::xml_to_srt(&xml, job.config.caption_max_len)
                .with_context(|| format!("converting {}", path.display()))?;
            let guard = TempFileGuard::unique("reclip_captions", "srt");
            fs::write(guard.path(), srt).with_context(|| format!("writing {}", guard.path().display()))?;
            Some(guard)
        }
        None => None,
    };
    job.subtitles = captions_file.as_ref().map(|g| g.path().to_path_buf());

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .map_err(|e| anyhow!("invalid progress template: {}", e))?
            .progress_chars("#>-"),
    );

    let records = clip::run(tool, &job, &mut rand::thread_rng(), |progress| match progress.phase {
        ProgressPhase::ProbingMedia => pb.set_message(progress.message),
        ProgressPhase::RenderingParts => {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.completed as u64);
            pb.set_message("Rendering");
        }
        ProgressPhase::Complete => pb.finish_with_message("Done"),
    })?;

    let clip_log: RecordLog<ClipRecord> = RecordLog::new(log);
    for record in &records {
        clip_log.append(record)?;
    }

    println!(
        "\n{} parts of {} written to {} (logged in {})",
        records.len(),
        job.id,
        job.output_dir.display(),
        log.display()
    );
    Ok(())
}

/// Input arguments that hold a still image for the whole render.
fn still_input_args(path: &Path) -> Vec<String> {
    let is_gif = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("gif"));
    let loop_args = if is_gif { ["-ignore_loop", "0"] } else { ["-loop", "1"] };
    let mut args: Vec<String> = loop_args.iter().map(|s| s.to_string()).collect();
    args.push("-i".into());
    args.push(path.to_string_lossy().into_owned());
    args
}

fn run_meme(cfg: &AppConfig, tool: &MediaTool, images: &[PathBuf], background: &Path, out: &Path, duration: f64) -> Result<()> {
    if duration <= 0.0 {
        return Err(anyhow!("Duration must be positive, got {}", duration));
    }

    let sizes = images
        .iter()
        .map(|p| image::image_dimensions(p).with_context(|| format!("reading image size of {}", p.display())))
        .collect::<Result<Vec<_>>>()?;
    let graph = grid_overlay(&sizes, cfg.canvas_width, cfg.canvas_height)?;

    let mut args: Vec<String> = if clip::is_video(background) {
        vec!["-stream_loop".into(), "-1".into(), "-i".into(), background.to_string_lossy().into_owned()]
    } else {
        still_input_args(background)
    };
    for image in images {
        args.extend(still_input_args(image));
    }
    args.extend([
        "-filter_complex".to_string(),
        graph,
        "-map".to_string(),
        "[out]".to_string(),
        "-map".to_string(),
        "0:a?".to_string(),
        "-t".to_string(),
        format!("{:.3}", duration),
    ]);
    args.extend(quality_args(&cfg.quality));

    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
    }
    info!(images = images.len(), output = %out.display(), "compositing grid");
    tool.render(&args, out)?;
    println!("Grid of {} images written to {}", images.len(), out.display());
    Ok(())
}

fn run_fetch(cfg: &AppConfig, subreddits: &[String], out: &Path, limit: usize, per_category: usize, log: &Path) -> Result<()> {
    let client = RedditClient::new(cfg.user_agent.clone(), Duration::from_secs(cfg.http_timeout_secs));
    let post_log: RecordLog<PostRecord> = RecordLog::new(log);
    let mut rng = rand::thread_rng();
    let mut downloaded = 0usize;

    for subreddit in subreddits {
        for kind in LISTING_KINDS {
            let posts = match client.fetch_posts(subreddit, kind, limit) {
                Ok(posts) => posts,
                Err(e) => {
                    warn!(%subreddit, %kind, "skipping listing: {:#}", e);
                    continue;
                }
            };
            let images: Vec<_> = posts.into_iter().filter(|p| reddit::is_image_url(&p.url)).collect();
            info!(%subreddit, %kind, images = images.len(), "listing fetched");

            for post in images.choose_multiple(&mut rng, per_category) {
                let file_path = match client.download(&post.url, out) {
                    Ok(path) => {
                        downloaded += 1;
                        Some(path.to_string_lossy().into_owned())
                    }
                    Err(e) => {
                        warn!(url = %post.url, "download failed: {:#}", e);
                        None
                    }
                };
                post_log.append(&PostRecord {
                    post: post.clone(),
                    category: kind.to_string(),
                    file_path,
                })?;
            }
        }
    }

    println!("Downloaded {} images into {} (logged in {})", downloaded, out.display(), log.display());
    Ok(())
}
