//! Stamps the source commit and build date into the `packetscope` version.

use std::env;
use std::process::Command;

use time::OffsetDateTime;

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=PACKETSCOPE_COMMIT");

    let commit = env::var("PACKETSCOPE_COMMIT")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .or_else(|| git_output(&["rev-parse", "--short=10", "HEAD"]))
        .map(|value| value.chars().take(10).collect::<String>())
        .unwrap_or_else(|| "unknown".to_string());
    let date = OffsetDateTime::now_utc().date();

    println!("cargo:rustc-env=PACKETSCOPE_BUILD_COMMIT={commit}");
    println!("cargo:rustc-env=PACKETSCOPE_BUILD_DATE={date}");
}

fn git_output(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let value = String::from_utf8(output.stdout).ok()?.trim().to_string();
    (!value.is_empty()).then_some(value)
}
