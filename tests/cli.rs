use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn yt2audio(dir: &TempDir) -> Command {
    let config = dir.path().join("config.yaml");
    if !config.exists() {
        std::fs::write(&config, "download:\n  threads: 2\n").unwrap();
    }

    let mut cmd = Command::cargo_bin("yt2audio").unwrap();
    cmd.current_dir(dir.path()).arg("--config").arg(&config);
    cmd
}

#[test]
fn missing_url_file_exits_with_error() {
    let dir = TempDir::new().unwrap();

    yt2audio(&dir)
        .args(["download", "nope.txt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("file not found"));
}

#[test]
fn empty_url_file_exits_with_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("urls.txt"), "# nothing here\n\n").unwrap();

    yt2audio(&dir)
        .args(["download", "urls.txt"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("No URLs found in file."));
}

#[test]
fn missing_cookie_file_exits_with_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("urls.txt"), "https://youtu.be/dQw4w9WgXcQ\n").unwrap();

    yt2audio(&dir)
        .args(["download", "urls.txt", "--cookies", "cookies.txt"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("cookies file not found"));
}

#[test]
fn fully_archived_list_has_nothing_to_do() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("urls.txt"), "https://youtu.be/dQw4w9WgXcQ\n").unwrap();
    std::fs::create_dir(dir.path().join("output")).unwrap();
    std::fs::write(dir.path().join("output").join(".archive.txt"), "youtube dQw4w9WgXcQ\n").unwrap();

    yt2audio(&dir)
        .args(["download", "urls.txt", "--no-thumbnail"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 already in archive"))
        .stdout(predicate::str::contains("Nothing to do"));
}

#[test]
fn config_show_prints_effective_values() {
    let dir = TempDir::new().unwrap();

    yt2audio(&dir)
        .args(["config", "--show"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Threads:    2"))
        .stdout(predicate::str::contains("mp3 @ 128kbps"));
}

#[test]
fn help_lists_subcommands() {
    let dir = TempDir::new().unwrap();

    yt2audio(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("channel"));
}
