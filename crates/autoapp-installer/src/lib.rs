mod application;
mod clock;
mod fs_utils;
mod inspect;
mod launch_env;
mod partial;
mod report;
mod roots;
mod scheduler;
mod settings;
mod tooling;

pub use application::{
    installed_apps, AppContext, Application, InstallPlan, RuntimeDefaults, Session, Trigger,
    NO_ENTRY_POINTS_MESSAGE,
};
pub use clock::{Clock, SystemClock};
pub use fs_utils::{canonicalize_lenient, path_present, remove_file_if_exists, replace_symlink};
pub use inspect::{
    group_requests, DistInfoInspector, GroupEntry, IntrospectionCache, PackageInfo,
    PackageInspector, GROUP_ENTRY_POINT,
};
pub use launch_env::LaunchEnv;
pub use partial::{is_complete_build, BuildGuard, PartialBuilds, BUILD_MARKER};
pub use report::{MemoryReporter, Reporter};
pub use roots::{can_write, AppRoots, RootSelection, RootTiers, Tier, TierPaths, TierRejection};
pub use scheduler::{default_entry_id, render_entry, Crontab, Scheduler};
pub use settings::{Settings, KEY_APP_SPEC, KEY_RUNTIME_VERSION, KEY_UPDATE, SETTINGS_FILE};
pub use tooling::{is_runtime_mismatch, EnvRequest, EnvironmentInstaller, VenvInstaller};

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

#[cfg(test)]
mod tests;
