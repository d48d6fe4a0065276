//! `autogoals watch`: re-render the status view whenever the state changes.
//!
//! Read-only. Runs alongside a scheduler in another process.

use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use anyhow::{Result, bail};
use notify::{Event as NotifyEvent, EventKind, PollWatcher, RecursiveMode, Watcher};
use tracing::{debug, info};

use crate::io::init::AutogoalsPaths;
use crate::status::{build_status, render_status};
use crate::validate::Project;

#[derive(Debug, Clone)]
pub struct WatchOptions {
    pub poll_interval: Duration,
    /// Stop after this many renders. `None` watches until interrupted.
    pub max_renders: Option<usize>,
}

impl Default for WatchOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            max_renders: None,
        }
    }
}

/// Render once, then again after every relevant change in `.autogoals/`.
///
/// Identical consecutive views are not repeated. A state file that fails to
/// load is shown as an error line and watching continues.
pub fn watch_status<F: FnMut(&str)>(
    project: &Project,
    options: &WatchOptions,
    mut render: F,
) -> Result<()> {
    let dir = &project.paths.dir;
    if !dir.is_dir() {
        bail!(
            "{} does not exist; run `autogoals init` or `autogoals start` first",
            dir.display()
        );
    }

    let (tx, rx) = mpsc::channel::<NotifyEvent>();
    let mut watcher = PollWatcher::new(
        move |res: Result<NotifyEvent, notify::Error>| {
            if let Ok(event) = res {
                let _ = tx.send(event);
            }
        },
        notify::Config::default().with_poll_interval(options.poll_interval),
    )?;
    watcher.watch(dir, RecursiveMode::NonRecursive)?;
    info!(path = %dir.display(), "watching state directory");

    let mut renders = 0usize;
    let mut last_view = String::new();
    loop {
        let view = current_view(project);
        if view != last_view {
            render(&view);
            renders += 1;
            last_view = view;
        }
        if options.max_renders.is_some_and(|max| renders >= max) {
            return Ok(());
        }

        let Ok(event) = rx.recv() else {
            bail!("file watcher stopped");
        };
        let mut changed = is_relevant(&event, &project.paths);
        // Coalesce a burst of events (temp write + rename) into one render.
        while let Ok(event) = rx.try_recv() {
            changed |= is_relevant(&event, &project.paths);
        }
        if !changed {
            continue;
        }
        debug!(paths = ?event.paths, "state changed");
    }
}

fn current_view(project: &Project) -> String {
    match build_status(project) {
        Ok(report) => render_status(&report),
        Err(err) => format!("error: {err:#}\n"),
    }
}

/// Whether `event` touches the state file or the pause flag.
pub fn is_relevant(event: &NotifyEvent, paths: &AutogoalsPaths) -> bool {
    if !matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) {
        return false;
    }
    event
        .paths
        .iter()
        .any(|path| same_file_name(path, &paths.state_path) || same_file_name(path, &paths.pause_path))
}

fn same_file_name(path: &Path, target: &Path) -> bool {
    path.file_name().is_some() && path.file_name() == target.file_name()
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::test_support::TestProject;
    use crate::validate::load_project;

    fn event(kind: EventKind, path: PathBuf) -> NotifyEvent {
        NotifyEvent {
            kind,
            paths: vec![path],
            attrs: Default::default(),
        }
    }

    #[test]
    fn state_and_pause_changes_are_relevant() {
        let paths = AutogoalsPaths::new("/w");
        let modify = EventKind::Modify(notify::event::ModifyKind::Any);

        assert!(is_relevant(&event(modify, paths.state_path.clone()), &paths));
        assert!(is_relevant(
            &event(
                EventKind::Create(notify::event::CreateKind::File),
                paths.pause_path.clone()
            ),
            &paths
        ));
        assert!(!is_relevant(&event(modify, paths.backup_path.clone()), &paths));
        assert!(!is_relevant(
            &event(EventKind::Access(notify::event::AccessKind::Any), paths.state_path.clone()),
            &paths
        ));
    }

    #[test]
    fn renders_initial_view() {
        let test = TestProject::new("project_name: demo\ngoals:\n  - id: a\n").expect("project");
        std::fs::create_dir_all(&test.paths.dir).expect("dir");
        let project = load_project(&test.paths).expect("load");
        let mut views = Vec::new();

        watch_status(
            &project,
            &WatchOptions {
                poll_interval: Duration::from_millis(50),
                max_renders: Some(1),
            },
            |view| views.push(view.to_string()),
        )
        .expect("watch");

        assert_eq!(views.len(), 1);
        assert!(views[0].starts_with("demo: 0/1 completed"));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let test = TestProject::new("goals:\n  - id: a\n").expect("project");
        let project = load_project(&test.paths).expect("load");
        let err = watch_status(&project, &WatchOptions::default(), |_| {}).expect_err("no dir");
        assert!(err.to_string().contains("autogoals init"));
    }
}
