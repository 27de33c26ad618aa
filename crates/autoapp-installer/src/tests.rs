use super::*;
use crate::inspect::parse_group_entry;
use crate::scheduler::{id_matcher, without_entries};
use crate::testing::{FakeInstaller, TestBed};
use autoapp_core::{AppError, AppSpec, Request, UpdatePolicy};
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::time::Duration;

fn plan<'p>(spec: &'p AppSpec, version: &'p str) -> InstallPlan<'p> {
    InstallPlan {
        spec,
        version,
        policy: None,
        runtime_version: None,
        trigger: Trigger::Install,
    }
}

fn spec(raw: &str) -> AppSpec {
    AppSpec::parse(raw).expect("spec must parse")
}

fn app_error(err: &anyhow::Error) -> &AppError {
    err.downcast_ref::<AppError>().expect("must be an AppError")
}

#[test]
fn select_prefers_system_tier_when_writable() {
    let bed = TestBed::new(FakeInstaller::new());
    let selection = AppRoots::select_with(bed.tiers(), |_| true).expect("must select");

    assert_eq!(selection.roots.tier, Tier::System);
    assert!(selection.rejections.is_empty());
    assert!(!selection.roots.is_user());
    assert!(selection.roots.install_root.is_dir());
    assert!(selection.roots.symlink_root.is_dir());
    assert!(selection.roots.log_root.is_dir());
    assert!(selection.roots.privilege_hint().is_none());
}

#[test]
fn select_falls_back_to_local_tier() {
    let bed = TestBed::new(FakeInstaller::new());
    let system = bed.dir.path().join("system");
    let selection = AppRoots::select_with(bed.tiers(), |path: &Path| !path.starts_with(&system))
        .expect("must select");

    assert_eq!(selection.roots.tier, Tier::Local);
    assert_eq!(selection.rejections.len(), 1);
    assert_eq!(selection.rejections[0].tier, Tier::System);
    assert!(!selection.rejections[0].reasons.is_empty());
    assert!(selection.roots.install_root.is_dir());
}

#[test]
fn select_falls_back_to_user_tier_and_reports_reasons() {
    let bed = TestBed::new(FakeInstaller::new());
    let user = bed.dir.path().join("user");
    let selection = AppRoots::select_with(bed.tiers(), |path: &Path| path.starts_with(&user))
        .expect("must select");

    assert_eq!(selection.roots.tier, Tier::User);
    assert!(selection.roots.is_user());
    let tiers: Vec<Tier> = selection.rejections.iter().map(|r| r.tier).collect();
    assert_eq!(tiers, vec![Tier::System, Tier::Local]);
    assert!(selection.rejections[1]
        .reasons
        .iter()
        .all(|reason| reason.ends_with("is not writable")));
    assert!(selection.roots.privilege_hint().is_none());

    let system_bin = bed.dir.path().join("system").join("bin");
    fs::create_dir_all(&system_bin).expect("must create system bin");
    fs::write(system_bin.join("autoapp"), "").expect("must write executable");
    assert_eq!(
        selection.roots.privilege_hint(),
        Some(format!(
            "To see apps installed in {}, re-run using sudo.",
            bed.dir.path().join("system").join("apps").display()
        ))
    );
    assert_eq!(
        selection.roots.install_privilege_hint(),
        vec![
            format!(
                "# Based on permission, this will install to your user home instead of {}",
                system_bin.display()
            ),
            "  To install for everyone, cancel using CTRL+C and then re-run using sudo."
                .to_string(),
        ]
    );
}

#[test]
fn covers_any_known_install_root() {
    let bed = TestBed::new(FakeInstaller::new());
    let ctx = bed.context(true);
    let roots = &ctx.roots;

    assert!(roots.covers(&roots.install_root.join("bumper").join("current")));
    assert!(roots.covers(&bed.dir.path().join("user").join("apps").join("x")));
    assert!(!roots.covers(&roots.symlink_root.join("bumper")));
    assert!(!roots.covers(&bed.dir.path().join("system").join("apps2")));
}

#[test]
fn well_known_tiers_follow_home() {
    let tiers = RootTiers::well_known(Path::new("/home/alice"));
    assert_eq!(tiers.system.install_root, Path::new("/opt/apps"));
    assert_eq!(tiers.local.log_root, Path::new("/usr/local/var/log/autoapp"));
    assert_eq!(tiers.user.install_root, Path::new("/home/alice/.apps"));
    assert_eq!(tiers.user.symlink_root, Path::new("/home/alice/bin"));
    assert_eq!(tiers.user.log_root, Path::new("/home/alice/.apps/.log"));
}

#[test]
fn settings_merge_writes_and_removes_keys() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    fs::write(
        dir.path().join(SETTINGS_FILE),
        r#"{"app_spec": "bumper", "extra": 1}"#,
    )
    .expect("must seed settings");

    let settings = Settings::load(dir.path());
    assert_eq!(settings.app_spec(), Some("bumper"));

    let merged = settings.merged(&[
        (KEY_UPDATE, Value::from("daily")),
        (KEY_APP_SPEC, Value::Null),
    ]);
    merged.write(dir.path()).expect("must write settings");

    let reloaded = Settings::load(dir.path());
    assert_eq!(reloaded.app_spec(), None);
    assert_eq!(reloaded.update_policy(), Some(UpdatePolicy::Daily));
    let raw = fs::read_to_string(dir.path().join(SETTINGS_FILE)).expect("must read settings");
    assert!(raw.contains("\"extra\": 1"), "{raw}");
    assert_eq!(reloaded, merged);
    assert!(!dir.path().join("settings.json.tmp").exists());
}

#[test]
fn settings_ignore_unreadable_file() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    fs::write(dir.path().join(SETTINGS_FILE), "not json").expect("must seed settings");
    assert!(Settings::load(dir.path()).is_empty());
    assert!(Settings::load(&dir.path().join("missing")).is_empty());
}

#[test]
fn launch_env_drops_active_virtualenv() {
    let vars = [
        ("PATH", "/work/venv/bin:/usr/local/bin:/usr/bin"),
        ("VIRTUAL_ENV", "/work/venv"),
        ("PYTHONPATH", "/work/src"),
        ("HOME", "/home/alice"),
    ]
    .map(|(key, value)| (OsString::from(key), OsString::from(value)));

    let env = LaunchEnv::from_vars(vars);
    assert_eq!(
        env.get("PATH").and_then(|path| path.to_str()),
        Some("/usr/local/bin:/usr/bin")
    );
    assert!(env.get("VIRTUAL_ENV").is_none());
    assert!(env.get("PYTHONPATH").is_none());
    assert_eq!(
        env.get("HOME").and_then(|home| home.to_str()),
        Some("/home/alice")
    );
}

#[test]
fn group_entries_become_requests() {
    let entries = [
        parse_group_entry("bumper", "latest"),
        parse_group_entry("tool", "0.1 [daily]"),
        parse_group_entry("exact", "1.2.3"),
        parse_group_entry("odd", "2 [yearly]"),
    ];
    assert_eq!(entries[1].policy.as_deref(), Some("daily"));

    assert_eq!(
        group_requests(&entries),
        vec![
            Request::Pinned("bumper".to_string(), Some(UpdatePolicy::Hourly)),
            Request::Pinned("tool==0.1.*".to_string(), Some(UpdatePolicy::Daily)),
            Request::Pinned("exact==1.2.3".to_string(), None),
            Request::Pinned("odd==2.*".to_string(), Some(UpdatePolicy::Hourly)),
        ]
    );
}

#[test]
fn inspector_reads_entry_points() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let dist_info = dir
        .path()
        .join("lib/python3.12/site-packages/my_tool-1.0.0.dist-info");
    fs::create_dir_all(&dist_info).expect("must create dist-info");
    fs::write(
        dist_info.join("entry_points.txt"),
        "[console_scripts]\nmytool = my_tool.cli:main\nmt = my_tool.cli:main\n\n\
         [autoapp]\nhelper = 0.2 [weekly]\n",
    )
    .expect("must write entry points");

    let info = DistInfoInspector
        .inspect("My.Tool", dir.path())
        .expect("must inspect");
    let scripts: Vec<&str> = info.scripts.iter().map(String::as_str).collect();
    assert_eq!(scripts, vec!["mt", "mytool"]);
    assert_eq!(
        info.group_entries,
        vec![GroupEntry {
            app: "helper".to_string(),
            version: "0.2".to_string(),
            policy: Some("weekly".to_string()),
        }]
    );
}

#[test]
fn inspector_falls_back_to_record() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let dist_info = dir.path().join("lib/python3.9/site-packages/legacy-2.0.dist-info");
    fs::create_dir_all(&dist_info).expect("must create dist-info");
    fs::write(
        dist_info.join("RECORD"),
        "legacy/__init__.py,sha256=abc,10\n../../../bin/legacy-run,sha256=def,120\n",
    )
    .expect("must write record");

    let info = DistInfoInspector
        .inspect("legacy", dir.path())
        .expect("must inspect");
    assert_eq!(info.scripts.into_iter().collect::<Vec<_>>(), vec!["legacy-run"]);
}

#[test]
fn inspector_reports_missing_metadata() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    assert!(DistInfoInspector.inspect("ghost", dir.path()).is_err());
}

#[test]
fn schedule_entries_render_and_filter() {
    assert_eq!(
        default_entry_id("/usr/local/bin/autoapp update 2>&1 >> /var/log/autoapp/cron.log"),
        "/usr/local/bin/autoapp update"
    );
    assert_eq!(
        render_entry("? 3 * * *", 7, "/usr/bin:/bin", "autoapp update"),
        "7 3 * * * PATH=/usr/bin:/bin autoapp update"
    );

    let table = "0 * * * * PATH=/bin autoapp update\n5 3 * * * backup.sh\n";
    let matcher = id_matcher("AUTOAPP UPDATE").expect("must compile");
    assert_eq!(without_entries(table, &matcher), "5 3 * * * backup.sh\n");
}

#[test]
fn canonicalize_lenient_follows_dangling_links() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let real = fs::canonicalize(dir.path()).expect("must canonicalize");
    fs::create_dir_all(real.join("app/1.0/bin")).expect("must create tree");
    symlink(real.join("app/1.0"), real.join("app/current")).expect("must link");
    symlink(real.join("app/current/bin/gone"), real.join("gone")).expect("must link");

    assert_eq!(
        canonicalize_lenient(&real.join("gone")),
        real.join("app/1.0/bin/gone")
    );
    assert_eq!(
        canonicalize_lenient(&real.join("missing/child")),
        real.join("missing/child")
    );
}

#[test]
fn replace_symlink_clears_stale_staging_link() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let root = dir.path();
    fs::create_dir_all(root.join("a")).expect("must create a");
    fs::create_dir_all(root.join("b")).expect("must create b");
    symlink(root.join("a"), root.join("current")).expect("must link");
    symlink(root.join("elsewhere"), root.join("staging")).expect("must link");

    replace_symlink(&root.join("b"), &root.join("current"), &root.join("staging"))
        .expect("must replace");
    assert_eq!(
        fs::read_link(root.join("current")).expect("must read link"),
        root.join("b")
    );
    assert!(!path_present(&root.join("staging")));
}

#[test]
fn install_links_scripts_and_records_settings() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");

    let changed = app.install(&plan(&requested, "0.1.12")).expect("must install");
    assert!(changed);

    let root = bed.install_root();
    let bin = bed.symlink_root();
    assert_eq!(
        bed.reporter.take_text(),
        format!(
            "Installing bumper to {}\nUpdating script symlinks in {}\n+ bumper\n",
            root.join("bumper/0.1.12").display(),
            bin.display()
        )
    );
    assert_eq!(app.current_version().as_deref(), Some("0.1.12"));
    assert_eq!(
        fs::canonicalize(bin.join("bumper")).expect("link must resolve"),
        root.join("bumper/0.1.12/bin/bumper")
    );

    let settings = app.settings();
    assert_eq!(settings.app_spec(), Some("bumper"));
    assert_eq!(settings.runtime_version(), Some("3"));
    assert_eq!(settings.update_policy(), None);
    assert!(bed.scheduler.entries().is_empty());
}

#[test]
fn install_again_reports_up_to_date_without_changes() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);

    let pinned = spec("bumper==0.1.12");
    app.install(&plan(&pinned, "0.1.12")).expect("must install");
    bed.reporter.take();

    let changed = app.install(&plan(&pinned, "0.1.12")).expect("must reinstall");
    assert!(!changed);
    assert_eq!(
        bed.reporter.take_text(),
        "bumper is up-to-date [per spec: ==0.1.12]\n"
    );
    assert_eq!(bed.installer.created().len(), 1);
}

#[test]
fn unattended_install_of_current_version_is_silent() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let requested = spec("bumper");
    {
        let ctx = bed.context(true);
        Application::new("bumper", &ctx)
            .install(&plan(&requested, "0.1.12"))
            .expect("must install");
    }
    bed.reporter.take();

    let ctx = bed.context(false);
    let mut update = plan(&requested, "0.1.12");
    update.trigger = Trigger::Update;
    let changed = Application::new("bumper", &ctx)
        .install(&update)
        .expect("must update");
    assert!(!changed);
    assert!(bed.reporter.take().is_empty());
}

#[test]
fn upgrade_switches_current_and_prunes_previous() {
    let installer = FakeInstaller::new().with_package("bumper", &["bumper", "bumper-old"]);
    let bed = TestBed::new(installer.clone());
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");

    app.install(&plan(&requested, "0.1.11")).expect("must install");
    bed.reporter.take();

    let _ = installer.with_package("bumper", &["bumper"]);
    app.install(&plan(&requested, "0.1.12")).expect("must upgrade");

    let root = bed.install_root();
    assert_eq!(
        bed.reporter.take_text(),
        format!(
            "Installing bumper to {}\n- Removed bumper-old\n",
            root.join("bumper/0.1.12").display()
        )
    );
    assert_eq!(app.current_version().as_deref(), Some("0.1.12"));
    assert!(!root.join("bumper/0.1.11").exists());
    assert!(!path_present(&bed.symlink_root().join("bumper-old")));
    assert!(bed.symlink_root().join("bumper").exists());
}

#[test]
fn interrupted_switch_leaves_previous_version_active() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");
    app.install(&plan(&requested, "0.1.11")).expect("must install");

    let staging = app.path().join("atomic_symlink_for_bumper");
    symlink(app.path().join("0.1.12"), &staging).expect("must leave stale link");
    assert_eq!(app.current_version().as_deref(), Some("0.1.11"));

    app.install(&plan(&requested, "0.1.12")).expect("must upgrade");
    assert_eq!(app.current_version().as_deref(), Some("0.1.12"));
    assert!(!path_present(&staging));
}

#[test]
fn previously_installed_version_is_reactivated() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");
    app.install(&plan(&requested, "0.1.12")).expect("must install");

    let leftover = app.path().join("0.1.10");
    fs::create_dir_all(leftover.join("bin")).expect("must create leftover");
    fs::create_dir_all(leftover.join("lib/python3/site-packages/bumper-0.1.10.dist-info"))
        .expect("must create dist-info");
    fs::write(
        leftover.join("lib/python3/site-packages/bumper-0.1.10.dist-info/entry_points.txt"),
        "[console_scripts]\nbumper = bumper:main\n",
    )
    .expect("must write entry points");
    fs::write(leftover.join(BUILD_MARKER), "").expect("must mark complete");
    bed.reporter.take();

    let pinned = spec("bumper==0.1.10");
    app.install(&plan(&pinned, "0.1.10")).expect("must switch");
    assert_eq!(
        bed.reporter.take(),
        vec!["bumper 0.1.10 was previously installed and will be set as the current version"]
    );
    assert_eq!(app.current_version().as_deref(), Some("0.1.10"));
    assert!(!app.path().join("0.1.12").exists());
}

#[test]
fn unfinished_version_directory_is_rebuilt() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");
    app.install(&plan(&requested, "0.1.11")).expect("must install");

    let unfinished = app.path().join("0.1.12");
    fs::create_dir_all(unfinished.join("bin")).expect("must create unfinished build");
    fs::write(unfinished.join("bin").join("python"), "").expect("must write interpreter");
    bed.reporter.take();

    assert!(app.install(&plan(&requested, "0.1.12")).expect("must rebuild"));
    assert!(bed
        .reporter
        .take()
        .contains(&format!("Installing bumper to {}", unfinished.display())));
    assert_eq!(app.current_version().as_deref(), Some("0.1.12"));
    assert!(is_complete_build(&unfinished));
    assert!(!unfinished.join("bin").join("python").exists());
    assert_eq!(
        bed.installer.created(),
        vec!["bumper==0.1.11 (python 3)", "bumper==0.1.12 (python 3)"]
    );
    assert!(ctx.builds.in_progress().is_empty());
}

#[test]
fn active_version_without_marker_is_kept() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");
    app.install(&plan(&requested, "0.1.12")).expect("must install");
    fs::remove_file(app.path().join("0.1.12").join(BUILD_MARKER)).expect("must drop marker");
    bed.reporter.take();

    assert!(!app.install(&plan(&requested, "0.1.12")).expect("must reinstall"));
    assert_eq!(bed.reporter.take(), vec!["bumper is up-to-date"]);
    assert_eq!(bed.installer.created().len(), 1);
}

#[test]
fn partial_builds_are_discarded_until_finished() {
    let dir = tempfile::tempdir().expect("must create temp dir");
    let first = dir.path().join("first");
    let second = dir.path().join("second");
    fs::create_dir_all(&first).expect("must create first");
    fs::create_dir_all(&second).expect("must create second");

    let builds = PartialBuilds::new();
    let shared = builds.clone();
    {
        let _done = builds.track(&first);
        assert_eq!(shared.in_progress(), vec![first.clone()]);
    }
    let _running = builds.track(&second);
    assert_eq!(shared.in_progress(), vec![second.clone()]);

    assert_eq!(shared.discard(), vec![second.clone()]);
    assert!(first.is_dir());
    assert!(!second.exists());
    assert!(builds.in_progress().is_empty());
}

#[test]
fn foreign_script_is_left_alone() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let foreign = bed.symlink_root().join("bumper");
    fs::write(&foreign, "#!/bin/sh\necho mine\n").expect("must write foreign script");

    Application::new("bumper", &ctx)
        .install(&plan(&spec("bumper"), "0.1.12"))
        .expect("must install");

    let lines = bed.reporter.take();
    assert_eq!(
        lines.last().map(String::as_str),
        Some("! bumper (can not change / not managed by autoapp)")
    );
    assert_eq!(
        fs::read_to_string(&foreign).expect("must read foreign script"),
        "#!/bin/sh\necho mine\n"
    );
}

#[test]
fn script_from_another_managed_root_is_replaced() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let link = bed.symlink_root().join("bumper");
    let other = bed.dir.path().join("user/apps/bumper/current/bin/bumper");
    symlink(&other, &link).expect("must link");

    Application::new("bumper", &ctx)
        .install(&plan(&spec("bumper"), "0.1.12"))
        .expect("must install");

    let lines = bed.reporter.take();
    assert_eq!(lines.last().map(String::as_str), Some("* bumper (updated)"));
    assert_eq!(
        fs::canonicalize(&link).expect("link must resolve"),
        bed.install_root().join("bumper/0.1.12/bin/bumper")
    );
}

#[test]
fn package_without_scripts_is_rejected_and_removed() {
    let bed = TestBed::new(FakeInstaller::new().with_package("libonly", &[]));
    let ctx = bed.context(true);
    let app = Application::new("libonly", &ctx);

    let err = app
        .install(&plan(&spec("libonly"), "1.0.0"))
        .expect_err("must reject");
    assert!(matches!(app_error(&err), AppError::InvalidAction(message) if message.starts_with("Odd, there are no scripts")));
    assert!(!app.path().exists());
    assert_eq!(
        bed.reporter.take().last().map(String::as_str),
        Some("Uninstalling libonly")
    );
}

#[test]
fn group_only_package_is_valid() {
    let installer = FakeInstaller::new()
        .with_package("suite", &[])
        .with_group_entry("suite", "bumper", "latest");
    let bed = TestBed::new(installer);
    let ctx = bed.context(true);
    let app = Application::new("suite", &ctx);

    app.install(&plan(&spec("suite"), "2.0.0")).expect("must install");
    assert_eq!(app.group_names(), vec!["bumper"]);
    assert_eq!(
        app.group_requests(),
        vec![Request::Pinned("bumper".to_string(), Some(UpdatePolicy::Hourly))]
    );
}

#[test]
fn runtime_mismatch_retries_with_fallback() {
    let installer = FakeInstaller::new()
        .with_package("legacy", &["legacy"])
        .requiring_runtime("legacy", "3.8");
    let bed = TestBed::new(installer);
    let ctx = bed.context(true);
    let app = Application::new("legacy", &ctx);

    app.install(&plan(&spec("legacy"), "1.0.0")).expect("must install");
    let lines = bed.reporter.take();
    assert_eq!(
        lines[1],
        "legacy requires a different Python version, retrying with Python 3.8"
    );
    assert_eq!(app.settings().runtime_version(), Some("3.8"));
    assert_eq!(bed.installer.created(), vec!["legacy==1.0.0 (python 3.8)"]);
}

#[test]
fn missing_runtime_is_reported() {
    let bed = TestBed::new(
        FakeInstaller::new()
            .with_package("bumper", &["bumper"])
            .with_runtimes(&["3.8"]),
    );
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);

    let err = app
        .install(&plan(&spec("bumper"), "0.1.12"))
        .expect_err("must fail");
    assert!(matches!(app_error(&err), AppError::MissingCollaborator(_)));
    assert!(!app.is_installed());
}

#[test]
fn tool_failure_output_is_shown_and_cleaned_up() {
    let bed = TestBed::new(FakeInstaller::new());
    let ctx = bed.context(true);
    let app = Application::new("ghost", &ctx);

    let err = app
        .install(&plan(&spec("ghost"), "1.0.0"))
        .expect_err("must fail");
    assert!(matches!(app_error(&err), AppError::InstallToolFailure { .. }));
    let lines = bed.reporter.take();
    assert!(lines.contains(&"ERROR: No matching distribution found for ghost==1.0.0".to_string()));
    assert!(lines
        .last()
        .is_some_and(|line| line.starts_with("! Failed to install using Python 3.")));
    assert!(!app.path().exists());
}

#[test]
fn policy_enables_single_schedule_entry() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");
    let mut daily = plan(&requested, "0.1.12");
    daily.policy = Some(UpdatePolicy::Daily);

    app.install(&daily).expect("must install");
    let lines = bed.reporter.take();
    assert_eq!(lines[1], "Daily auto-update enabled via cron service");
    assert_eq!(app.settings().update_policy(), Some(UpdatePolicy::Daily));

    let entries = bed.scheduler.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("0 3 * * * PATH="));
    assert!(entries[0].ends_with(&format!(
        "autoapp update 2>&1 >> {}",
        ctx.roots.log_root.join("cron.log").display()
    )));

    assert!(!app.install(&daily).expect("must reinstall"));
    assert_eq!(bed.reporter.take(), vec!["bumper is up-to-date"]);
    assert_eq!(bed.scheduler.entries(), entries);
}

#[test]
fn pinning_disables_auto_update() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    let requested = spec("bumper");
    let mut hourly = plan(&requested, "0.1.12");
    hourly.policy = Some(UpdatePolicy::Hourly);
    app.install(&hourly).expect("must install");
    bed.reporter.take();

    let pinned = spec("bumper==0.1.12");
    assert!(app.install(&plan(&pinned, "0.1.12")).expect("must pin"));
    assert_eq!(
        bed.reporter.take(),
        vec![
            "bumper is up-to-date [per spec: ==0.1.12]",
            "Auto-update will be disabled since we are pinning to a specific version.",
            "To enable, re-run without pinning to specific version with --update option",
        ]
    );
    assert_eq!(app.settings().update_policy(), None);
    assert_eq!(app.settings().app_spec(), Some("bumper==0.1.12"));
    assert!(bed.scheduler.entries().is_empty());
}

#[test]
fn legacy_entries_migrate_into_settings() {
    let installer = FakeInstaller::new()
        .with_package("bumper", &["bumper"])
        .with_package("tool", &["tool"]);
    let bed = TestBed::new(installer);
    let ctx = bed.context(true);
    Application::new("tool", &ctx)
        .install(&plan(&spec("tool"), "1.4.0"))
        .expect("must install tool");
    bed.scheduler
        .seed(r#"12 3 * * * PATH=/bin autoapp install "tool==1.*" 2>&1 >> /tmp/cron.log"#);

    let requested = spec("bumper");
    let mut weekly = plan(&requested, "0.1.12");
    weekly.policy = Some(UpdatePolicy::Weekly);
    Application::new("bumper", &ctx)
        .install(&weekly)
        .expect("must install bumper");

    let tool = Application::new("tool", &ctx).settings();
    assert_eq!(tool.app_spec(), Some("tool==1.*"));
    assert_eq!(tool.update_policy(), Some(UpdatePolicy::Daily));

    let entries = bed.scheduler.entries();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("0 3 * * * "), "{entries:?}");
    assert!(entries[0].contains("autoapp update"));
}

#[test]
fn freshness_follows_directory_mtime() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    app.install(&plan(&spec("bumper"), "0.1.12")).expect("must install");

    let now = std::time::SystemTime::now();
    app.touch(now - Duration::from_secs(7_200)).expect("must touch");
    assert!(!app.is_fresh(UpdatePolicy::Hourly, now));
    assert!(app.is_fresh(UpdatePolicy::Daily, now));

    app.touch(now).expect("must touch");
    assert!(app.is_fresh(UpdatePolicy::Hourly, now));
}

#[test]
fn uninstall_removes_owned_links_only() {
    let bed = TestBed::new(FakeInstaller::new().with_package("bumper", &["bumper", "bump"]));
    let ctx = bed.context(true);
    let app = Application::new("bumper", &ctx);
    app.install(&plan(&spec("bumper"), "0.1.12")).expect("must install");

    let bin = bed.symlink_root();
    fs::remove_file(bin.join("bump")).expect("must remove link");
    fs::write(bin.join("bump"), "foreign").expect("must write foreign script");
    bed.scheduler
        .seed(r#"0 * * * * PATH=/bin autoapp install "bumper" 2>&1 >> /tmp/cron.log"#);
    bed.reporter.take();

    app.uninstall().expect("must uninstall");
    assert_eq!(bed.reporter.take(), vec!["Uninstalling bumper"]);
    assert!(!app.path().exists());
    assert!(!path_present(&bin.join("bumper")));
    assert!(bin.join("bump").exists());
    assert!(bed.scheduler.entries().is_empty());
    assert!(installed_apps(&ctx).expect("must list").is_empty());
}
