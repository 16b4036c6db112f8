use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::fs;
use tracing::{debug, info, warn};

use super::artifacts::{render_concat_list, ArtifactSet};
use super::error::{BrandingError, BrandingResult};
use super::graph::{
    FfmpegInvocation, Filter, FilterChain, FilterGraph, MediaInput, StreamKind, StreamLabel,
};
use super::probe::{Dimensions, MediaProbe};
use crate::config::{BrandingMode, BrandingSection, PipelineConfig};
use crate::tools::{run_checked, CommandRunner};

const SINGLE_PASS_SUBSCRIBE_FROM: u32 = 5;

/// `Raw -> Overlaid -> Concatenated -> Finalized`; any failure is terminal for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BrandingStage {
    Raw,
    Overlaid,
    Concatenated,
    Finalized,
}

impl BrandingStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrandingStage::Raw => "raw",
            BrandingStage::Overlaid => "overlaid",
            BrandingStage::Concatenated => "concatenated",
            BrandingStage::Finalized => "finalized",
        }
    }
}

impl fmt::Display for BrandingStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandingAssets {
    pub logo: PathBuf,
    pub subscribe_image: Option<PathBuf>,
    pub subscribe_clip: PathBuf,
}

impl BrandingAssets {
    pub fn from_config(config: &PipelineConfig) -> Self {
        let branding = &config.branding;
        Self {
            logo: config.asset_path(&branding.logo),
            subscribe_image: branding
                .subscribe_image
                .as_ref()
                .map(|image| config.asset_path(image)),
            subscribe_clip: config.asset_path(&branding.subscribe_clip),
        }
    }

    pub fn required(&self) -> Vec<&Path> {
        let mut paths = vec![self.logo.as_path(), self.subscribe_clip.as_path()];
        if let Some(image) = &self.subscribe_image {
            paths.push(image.as_path());
        }
        paths
    }

    /// Blocking check for construction time.
    pub fn check(&self) -> BrandingResult<()> {
        match self.required().into_iter().find(|path| !path.is_file()) {
            Some(path) => Err(BrandingError::MissingAsset {
                path: path.to_path_buf(),
            }),
            None => Ok(()),
        }
    }

    pub async fn verify(&self) -> BrandingResult<()> {
        for path in self.required() {
            if fs::metadata(path).await.is_err() {
                return Err(BrandingError::MissingAsset {
                    path: path.to_path_buf(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrandedArtifact {
    pub path: PathBuf,
    pub dimensions: Dimensions,
    pub stage: BrandingStage,
}

pub struct BrandingCompositor {
    runner: Arc<dyn CommandRunner>,
    probe: MediaProbe,
    assets: BrandingAssets,
    settings: BrandingSection,
    timeout: Duration,
}

impl BrandingCompositor {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        settings: &BrandingSection,
        assets: BrandingAssets,
    ) -> Self {
        let timeout = Duration::from_secs(settings.timeout_seconds.max(1));
        Self {
            probe: MediaProbe::new(Arc::clone(&runner), settings.ffprobe.clone(), timeout),
            runner,
            assets,
            settings: settings.clone(),
            timeout,
        }
    }

    pub fn mode(&self) -> BrandingMode {
        self.settings.mode
    }

    pub fn assets(&self) -> &BrandingAssets {
        &self.assets
    }

    fn margin(&self) -> u32 {
        self.settings.logo_margin
    }

    fn divider(&self, y: impl ToString) -> Filter {
        Filter::new("drawbox")
            .opt("x", 0)
            .opt("y", y)
            .opt("w", "iw")
            .opt("h", 1)
            .opt("color", &self.settings.divider_color)
            .opt("t", "fill")
    }

    /// Divider, logo top-left, logo top-right, then the optional subscribe
    /// image bottom-right. Inputs: raw, logo, logo, subscribe image.
    pub fn overlay_graph(&self) -> FilterGraph {
        let m = self.margin();
        let has_image = self.assets.subscribe_image.is_some();
        let mut graph = FilterGraph::new()
            .chain(
                FilterChain::new()
                    .input(StreamLabel::input(0, StreamKind::Video))
                    .filter(self.divider(self.settings.divider_y))
                    .output(StreamLabel::named("base")),
            )
            .chain(
                FilterChain::new()
                    .input(StreamLabel::named("base"))
                    .input(StreamLabel::input(1, StreamKind::Video))
                    .filter(Filter::new("overlay").arg(m).arg(m))
                    .output(StreamLabel::named("tmp1")),
            )
            .chain(
                FilterChain::new()
                    .input(StreamLabel::named("tmp1"))
                    .input(StreamLabel::input(2, StreamKind::Video))
                    .filter(
                        Filter::new("overlay")
                            .arg(format!("main_w-overlay_w-{m}"))
                            .arg(m),
                    )
                    .output(StreamLabel::named(if has_image { "tmp2" } else { "v" })),
            );
        if has_image {
            let mut overlay = Filter::new("overlay")
                .arg(format!("main_w-overlay_w-{m}"))
                .arg(format!("main_h-overlay_h-{m}"));
            if let Some(from) = self.settings.subscribe_image_from_seconds {
                overlay = overlay.opt("enable", format!("gte(t,{from})"));
            }
            graph = graph.chain(
                FilterChain::new()
                    .input(StreamLabel::named("tmp2"))
                    .input(StreamLabel::input(3, StreamKind::Video))
                    .filter(overlay)
                    .output(StreamLabel::named("v")),
            );
        }
        graph
    }

    /// Scales the subscribe clip to `size` and joins it after the branded video.
    /// Inputs: branded intermediate, subscribe clip.
    pub fn concat_graph(size: Dimensions) -> FilterGraph {
        FilterGraph::new()
            .chain(
                FilterChain::new()
                    .input(StreamLabel::input(1, StreamKind::Video))
                    .filter(Filter::new("scale").arg(size.width).arg(size.height))
                    .filter(Filter::new("setsar").arg(1))
                    .output(StreamLabel::named("clip")),
            )
            .chain(
                FilterChain::new()
                    .input(StreamLabel::input(0, StreamKind::Video))
                    .filter(Filter::new("setsar").arg(1))
                    .output(StreamLabel::named("main")),
            )
            .chain(
                FilterChain::new()
                    .input(StreamLabel::named("main"))
                    .input(StreamLabel::input(0, StreamKind::Audio))
                    .input(StreamLabel::named("clip"))
                    .input(StreamLabel::input(1, StreamKind::Audio))
                    .filter(
                        Filter::new("concat")
                            .opt("n", 2)
                            .opt("v", 1)
                            .opt("a", 1),
                    )
                    .output(StreamLabel::named("v"))
                    .output(StreamLabel::named("a")),
            )
    }

    /// Both logos, a centre divider and the time-gated subscribe image in one graph.
    pub fn single_pass_graph(&self) -> FilterGraph {
        let m = self.margin();
        let has_image = self.assets.subscribe_image.is_some();
        let mut graph = FilterGraph::new()
            .chain(
                FilterChain::new()
                    .input(StreamLabel::input(0, StreamKind::Video))
                    .input(StreamLabel::input(1, StreamKind::Video))
                    .filter(Filter::new("overlay").arg(m).arg(m))
                    .output(StreamLabel::named("tmp1")),
            )
            .chain(
                FilterChain::new()
                    .input(StreamLabel::named("tmp1"))
                    .input(StreamLabel::input(2, StreamKind::Video))
                    .filter(Filter::new("overlay").arg(format!("W-w-{m}")).arg(m))
                    .output(StreamLabel::named("tmp2")),
            )
            .chain(
                FilterChain::new()
                    .input(StreamLabel::named("tmp2"))
                    .filter(self.divider("ih/2"))
                    .output(StreamLabel::named(if has_image { "tmp3" } else { "v" })),
            );
        if has_image {
            let from = self
                .settings
                .subscribe_image_from_seconds
                .unwrap_or(SINGLE_PASS_SUBSCRIBE_FROM);
            graph = graph.chain(
                FilterChain::new()
                    .input(StreamLabel::named("tmp3"))
                    .input(StreamLabel::input(3, StreamKind::Video))
                    .filter(
                        Filter::new("overlay")
                            .arg(format!("W-w-{m}"))
                            .arg(format!("H-h-{m}"))
                            .opt("enable", format!("gte(t,{from})")),
                    )
                    .output(StreamLabel::named("v")),
            );
        }
        graph
    }

    fn with_overlay_inputs(&self, invocation: FfmpegInvocation, raw: &Path) -> FfmpegInvocation {
        let mut invocation = invocation
            .input(MediaInput::file(raw))
            .input(MediaInput::file(&self.assets.logo))
            .input(MediaInput::file(&self.assets.logo));
        if let Some(image) = &self.assets.subscribe_image {
            invocation = invocation.input(MediaInput::file(image));
        }
        invocation
    }

    pub fn overlay_invocation(&self, artifacts: &ArtifactSet) -> FfmpegInvocation {
        self.with_overlay_inputs(FfmpegInvocation::new(&artifacts.intermediate), &artifacts.raw)
            .graph(self.overlay_graph())
            .map("[v]")
            .map("0:a?")
            .codec([
                "-c:v",
                self.settings.video_codec.as_str(),
                "-pix_fmt",
                self.settings.pixel_format.as_str(),
                "-c:a",
                "copy",
            ])
    }

    pub fn concat_invocation(&self, artifacts: &ArtifactSet, size: Dimensions) -> FfmpegInvocation {
        FfmpegInvocation::new(&artifacts.final_path)
            .input(MediaInput::file(&artifacts.intermediate))
            .input(MediaInput::file(&self.assets.subscribe_clip))
            .graph(Self::concat_graph(size))
            .map("[v]")
            .map("[a]")
            .codec([
                "-c:v",
                self.settings.video_codec.as_str(),
                "-pix_fmt",
                self.settings.pixel_format.as_str(),
                "-c:a",
                self.settings.audio_codec.as_str(),
            ])
    }

    pub fn single_pass_invocation(&self, artifacts: &ArtifactSet) -> FfmpegInvocation {
        self.with_overlay_inputs(FfmpegInvocation::new(&artifacts.intermediate), &artifacts.raw)
            .graph(self.single_pass_graph())
            .map("[v]")
            .map("0:a?")
            .codec([
                "-c:v",
                self.settings.video_codec.as_str(),
                "-pix_fmt",
                self.settings.pixel_format.as_str(),
                "-c:a",
                self.settings.audio_codec.as_str(),
                "-shortest",
            ])
    }

    pub fn stream_copy_invocation(&self, artifacts: &ArtifactSet) -> FfmpegInvocation {
        FfmpegInvocation::new(&artifacts.final_path)
            .input(MediaInput::concat_list(&artifacts.concat_list))
            .codec(["-c", "copy"])
    }

    /// Brands `artifacts.raw` into `artifacts.final_path`. On failure every
    /// artifact of the set is removed, the raw download only when
    /// `keep_raw_on_failure` is off.
    pub async fn brand(&self, artifacts: &ArtifactSet) -> BrandingResult<BrandedArtifact> {
        match self.run_stages(artifacts).await {
            Ok(branded) => Ok(branded),
            Err(err) => {
                warn!(stem = %artifacts.stem, error = %err, "branding failed, purging artifacts");
                artifacts.purge(self.settings.keep_raw_on_failure).await;
                Err(err)
            }
        }
    }

    async fn run_stages(&self, artifacts: &ArtifactSet) -> BrandingResult<BrandedArtifact> {
        self.assets.verify().await?;
        ensure_output(BrandingStage::Raw, &artifacts.raw).await?;

        match self.settings.mode {
            BrandingMode::TwoStage => {
                self.execute(BrandingStage::Overlaid, &self.overlay_invocation(artifacts))
                    .await?;
                ensure_output(BrandingStage::Overlaid, &artifacts.intermediate).await?;
                let size = self.probe.dimensions(&artifacts.intermediate).await?;
                debug!(stem = %artifacts.stem, size = %size, "intermediate probed");
                self.execute(
                    BrandingStage::Concatenated,
                    &self.concat_invocation(artifacts, size),
                )
                .await?;
            }
            BrandingMode::SinglePass => {
                self.execute(BrandingStage::Overlaid, &self.single_pass_invocation(artifacts))
                    .await?;
                ensure_output(BrandingStage::Overlaid, &artifacts.intermediate).await?;
                let list = render_concat_list(&[
                    artifacts.intermediate.as_path(),
                    self.assets.subscribe_clip.as_path(),
                ]);
                fs::write(&artifacts.concat_list, list)
                    .await
                    .map_err(|source| BrandingError::Io {
                        path: artifacts.concat_list.clone(),
                        source,
                    })?;
                self.execute(
                    BrandingStage::Concatenated,
                    &self.stream_copy_invocation(artifacts),
                )
                .await?;
            }
        }

        ensure_output(BrandingStage::Finalized, &artifacts.final_path).await?;
        let dimensions = self.probe.dimensions(&artifacts.final_path).await?;
        artifacts.remove_working_files().await;
        info!(
            stem = %artifacts.stem,
            path = %artifacts.final_path.display(),
            size = %dimensions,
            "branding finalized"
        );
        Ok(BrandedArtifact {
            path: artifacts.final_path.clone(),
            dimensions,
            stage: BrandingStage::Finalized,
        })
    }

    async fn execute(
        &self,
        stage: BrandingStage,
        invocation: &FfmpegInvocation,
    ) -> BrandingResult<()> {
        let command = invocation.to_command(&self.settings.ffmpeg, self.timeout);
        debug!(stage = %stage, output = %invocation.output.display(), "running ffmpeg");
        run_checked(self.runner.as_ref(), &command)
            .await
            .map(|_| ())
            .map_err(|source| BrandingError::Tool { stage, source })
    }
}

async fn ensure_output(stage: BrandingStage, path: &Path) -> BrandingResult<()> {
    match fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => Ok(()),
        _ => Err(BrandingError::MissingOutput {
            stage,
            path: path.to_path_buf(),
        }),
    }
}
