use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use highlights_core::branding::{ArtifactSet, BrandingAssets, BrandingCompositor, BrandingStage};
use highlights_core::config::{load_pipeline_config, BrandingMode, BrandingSection};
use highlights_core::tools::{CommandOutput, CommandRunner, ToolCommand, ToolResult};

fn fixture_branding() -> BrandingSection {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("configs/highlights.toml");
    load_pipeline_config(path).unwrap().branding
}

/// Fake ffmpeg/ffprobe. ffmpeg writes its output file unless the output ends
/// with `fail_suffix`. ffprobe reports the branded and final videos at the
/// 1920x1080 source size and the subscribe clip at 1280x720.
#[derive(Default)]
struct FakeFfmpeg {
    calls: Mutex<Vec<ToolCommand>>,
    fail_suffix: Option<&'static str>,
    concat_lists: Mutex<Vec<String>>,
}

impl FakeFfmpeg {
    fn ffmpeg_calls(&self) -> Vec<ToolCommand> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.program == "ffmpeg")
            .cloned()
            .collect()
    }
}

#[async_trait]
impl CommandRunner for FakeFfmpeg {
    async fn run(&self, command: &ToolCommand) -> ToolResult<CommandOutput> {
        self.calls.lock().unwrap().push(command.clone());
        let target = command.args.last().cloned().unwrap_or_default();
        if command.program == "ffprobe" {
            let size = if target.ends_with("subscribe.mp4") {
                (1280, 720)
            } else {
                (1920, 1080)
            };
            return Ok(CommandOutput::success(format!(
                r#"{{"streams":[{{"width":{},"height":{}}}]}}"#,
                size.0, size.1
            )));
        }
        if command.flag_value("-f") == Some("concat") {
            if let Some(list) = command.flag_value("-i") {
                let body = std::fs::read_to_string(list).unwrap();
                self.concat_lists.lock().unwrap().push(body);
            }
        }
        if let Some(suffix) = self.fail_suffix {
            if target.ends_with(suffix) {
                return Ok(CommandOutput::failure(1, "Error while filtering"));
            }
        }
        std::fs::write(&target, b"video").unwrap();
        Ok(CommandOutput::success(""))
    }
}

struct Workspace {
    _dir: TempDir,
    set: ArtifactSet,
    assets: BrandingAssets,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let assets_dir = dir.path().join("assets");
    let videos_dir = dir.path().join("videos");
    std::fs::create_dir_all(&assets_dir).unwrap();
    std::fs::create_dir_all(&videos_dir).unwrap();
    for name in ["logo.png", "subscribe.png", "subscribe.mp4"] {
        std::fs::write(assets_dir.join(name), b"asset").unwrap();
    }
    let set = ArtifactSet::for_stem(&videos_dir, "4328-1_Chelsea_vs_Arsenal");
    std::fs::write(&set.raw, b"raw").unwrap();
    Workspace {
        assets: BrandingAssets {
            logo: assets_dir.join("logo.png"),
            subscribe_image: Some(assets_dir.join("subscribe.png")),
            subscribe_clip: assets_dir.join("subscribe.mp4"),
        },
        set,
        _dir: dir,
    }
}

fn files_in(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn two_stage_scales_smaller_outro_up_to_intermediate_size() {
    let ws = workspace();
    let runner = Arc::new(FakeFfmpeg::default());
    let compositor =
        BrandingCompositor::new(runner.clone(), &fixture_branding(), ws.assets.clone());

    let branded = compositor.brand(&ws.set).await.unwrap();
    assert_eq!(branded.path, ws.set.final_path);
    assert_eq!(branded.stage, BrandingStage::Finalized);
    assert_eq!(branded.dimensions.to_string(), "1920x1080");

    let probed: Vec<String> = runner
        .calls
        .lock()
        .unwrap()
        .iter()
        .filter(|c| c.program == "ffprobe")
        .filter_map(|c| c.args.last().cloned())
        .collect();
    assert_eq!(probed.len(), 2);
    assert!(probed[0].ends_with("_branded.mp4"));
    assert!(probed[1].ends_with("_final.mp4"));

    let calls = runner.ffmpeg_calls();
    assert_eq!(calls.len(), 2);
    let overlay = calls[0].flag_value("-filter_complex").unwrap();
    assert!(overlay.starts_with("[0:v]drawbox=x=0:y=40"));
    let concat = calls[1].flag_value("-filter_complex").unwrap();
    assert!(concat.starts_with("[1:v]scale=1920:1080,setsar=1[clip]"));
    assert_eq!(calls[1].flag_value("-c:a"), Some("aac"));

    let videos = ws.set.final_path.parent().unwrap();
    assert_eq!(files_in(videos), vec!["4328-1_Chelsea_vs_Arsenal_final.mp4"]);
}

#[tokio::test]
async fn outro_failure_purges_every_artifact() {
    let ws = workspace();
    let runner = Arc::new(FakeFfmpeg {
        fail_suffix: Some("_final.mp4"),
        ..FakeFfmpeg::default()
    });
    let compositor =
        BrandingCompositor::new(runner.clone(), &fixture_branding(), ws.assets.clone());

    let err = compositor.brand(&ws.set).await.unwrap_err();
    assert!(!err.is_fatal());
    assert!(err.to_string().contains("concatenated"));
    assert!(ws.set.existing().await.is_empty());
}

#[tokio::test]
async fn raw_download_survives_failure_when_configured() {
    let ws = workspace();
    let runner = Arc::new(FakeFfmpeg {
        fail_suffix: Some("_branded.mp4"),
        ..FakeFfmpeg::default()
    });
    let mut settings = fixture_branding();
    settings.keep_raw_on_failure = true;
    let compositor = BrandingCompositor::new(runner.clone(), &settings, ws.assets.clone());

    compositor.brand(&ws.set).await.unwrap_err();
    assert_eq!(ws.set.existing().await, vec![ws.set.raw.clone()]);
}

#[tokio::test]
async fn single_pass_stream_copies_through_concat_list() {
    let ws = workspace();
    let runner = Arc::new(FakeFfmpeg::default());
    let mut settings = fixture_branding();
    settings.mode = BrandingMode::SinglePass;
    let compositor = BrandingCompositor::new(runner.clone(), &settings, ws.assets.clone());

    compositor.brand(&ws.set).await.unwrap();

    let calls = runner.ffmpeg_calls();
    assert_eq!(calls.len(), 2);
    assert!(calls[0].has_flag("-shortest"));
    assert_eq!(calls[1].flag_value("-c"), Some("copy"));

    let lists = runner.concat_lists.lock().unwrap().clone();
    assert_eq!(lists.len(), 1);
    assert!(lists[0].starts_with("ffconcat version 1.0\n"));
    assert!(lists[0].contains("_branded.mp4'"));
    assert!(lists[0].contains("subscribe.mp4'"));

    assert!(!ws.set.concat_list.exists());
    assert_eq!(ws.set.existing().await, vec![ws.set.final_path.clone()]);
}
