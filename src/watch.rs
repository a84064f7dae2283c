use std::{path::Path, time::Duration};

use anyhow::Context;
use notify::{DebouncedEvent, Watcher};

/// Calls `run` once, then again every time something below `root` changes. Only returns if the
/// watcher stops or cannot be started.
pub fn watch(root: &Path, mut run: impl FnMut() -> anyhow::Result<()>) -> anyhow::Result<()> {
    let (sender, receiver) = std::sync::mpsc::channel();
    let debounce = Duration::from_millis(200);

    // keep the watcher around for the whole loop so that the channel isn't closed
    let mut watcher =
        notify::PollWatcher::new(sender, debounce).context("could not start file watcher")?;
    watcher
        .watch(root, notify::RecursiveMode::Recursive)
        .with_context(|| format!("could not watch {root:?}"))?;

    revalidate(&mut run);
    info!(root = %root.display(), "watching for changes");

    while let Ok(event) = receiver.recv() {
        if !is_change(&event) {
            continue;
        }

        // sleep a bit so that a burst of writes ends up in the queue
        std::thread::sleep(Duration::from_millis(10));

        // skip all events currently in the queue
        while receiver.try_recv().is_ok() {}

        debug!(?event, "shaders changed");
        revalidate(&mut run);
    }

    warn!("file watcher stopped");
    Ok(())
}

fn revalidate(run: &mut impl FnMut() -> anyhow::Result<()>) {
    if let Err(error) = run() {
        error!("could not validate shaders: {error:#}");
    }
}

fn is_change(event: &DebouncedEvent) -> bool {
    match event {
        DebouncedEvent::Rescan
        | DebouncedEvent::Error(_, _)
        | DebouncedEvent::NoticeWrite(_)
        | DebouncedEvent::NoticeRemove(_) => false,
        DebouncedEvent::Create(_)
        | DebouncedEvent::Write(_)
        | DebouncedEvent::Chmod(_)
        | DebouncedEvent::Remove(_)
        | DebouncedEvent::Rename(_, _) => true,
    }
}
