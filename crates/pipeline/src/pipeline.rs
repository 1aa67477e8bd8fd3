use tracing::{info, instrument};

use weatherbox_fetch::Fetcher;
use weatherbox_models::{BuildConfig, BuildError, ExclusionSet, StagingArea};
use weatherbox_packaging::{AssembledImage, Assembler, HelperBuilder, Installer};

/// Staging area names, one per stage. The areas are disjoint directories
/// under the configured staging root, which is what lets the env and helper
/// stages run concurrently without coordination.
pub const FETCH_STAGE: &str = "fetch";
pub const ENV_STAGE: &str = "env";
pub const HELPER_STAGE: &str = "helper";

/// The single build pipeline, parameterized by the configured variant:
/// fetch, then dependency install and (for `WithHelper`) the native helper
/// build concurrently, then assembly at the join point. The first stage error
/// aborts the run and nothing downstream is promoted.
pub struct BuildPipeline {
    config: BuildConfig,
    fetcher: Fetcher,
    installer: Installer,
    helper: HelperBuilder,
    assembler: Assembler,
}

impl BuildPipeline {
    pub fn new(config: BuildConfig) -> Self {
        let fetcher = Fetcher::new(config.tools.git_bin.clone());
        let installer = Installer::new(
            config.tools.python_bin.clone(),
            ExclusionSet::new(&config.install.exclude),
        );
        let helper = HelperBuilder::new(config.tools.go_bin.clone());
        let assembler = Assembler::new(config.clone());
        Self {
            config,
            fetcher,
            installer,
            helper,
            assembler,
        }
    }

    #[instrument(skip(self), fields(variant = ?self.config.variant))]
    pub async fn run(&self) -> Result<AssembledImage, BuildError> {
        let staging_root = &self.config.staging.root;
        let fetch_area = StagingArea::create(staging_root, FETCH_STAGE)?;
        let env_area = StagingArea::create(staging_root, ENV_STAGE)?;
        let helper_area = StagingArea::create(staging_root, HELPER_STAGE)?;

        let source = self.config.source_ref();
        info!("Building {} from {}", self.config.image.name, source);

        let snapshot = self.fetcher.fetch(&source, &fetch_area).await?;

        let manifest_path = &self.config.source.manifest_path;
        if self.config.variant.includes_helper() {
            // Disjoint staging areas, no shared state: run both stages at
            // once and stop at the first failure.
            tokio::try_join!(
                self.installer.install(&snapshot, manifest_path, &env_area),
                self.helper.build(
                    &snapshot,
                    &self.config.source.helper_subtree,
                    &self.config.source.helper_name,
                    &helper_area,
                ),
            )?;
        } else {
            self.installer
                .install(&snapshot, manifest_path, &env_area)
                .await?;
        }

        let helper_for_assembly = self
            .config
            .variant
            .includes_helper()
            .then_some(&helper_area);
        let image = self
            .assembler
            .assemble(&snapshot, &fetch_area, &env_area, helper_for_assembly)
            .await?;

        info!(
            "Build complete: {} (layer {} bytes, digest {})",
            image.dir.display(),
            std::fs::metadata(&image.layer_file)?.len(),
            image.manifest.layer_digest
        );
        Ok(image)
    }
}
