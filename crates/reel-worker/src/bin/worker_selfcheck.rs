use std::path::Path;
use std::process::Command;

use reel_worker::{BackendMode, WorkerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = WorkerConfig::from_env()?;

    println!(
        "worker-selfcheck: starting kind={} work_dir={}",
        config.kind.as_str(),
        config.work_dir.display()
    );
    ensure_workdir(&config.work_dir).await?;
    ensure_ffmpeg()?;
    ensure_command(&config.stt_command)?;
    match config.backend {
        BackendMode::Remote => ensure_env_present(&["FILE_SERVER_URL", "FILE_SERVER_API_KEY"])?,
        BackendMode::Local => ensure_env_present(&["REEL_DATA_DIR"])?,
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_workdir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path).await?;
    let probe = path.join(".selfcheck");
    tokio::fs::write(&probe, b"ok").await?;
    tokio::fs::remove_file(&probe).await?;
    Ok(())
}

fn ensure_ffmpeg() -> anyhow::Result<()> {
    let output = Command::new("ffmpeg")
        .arg("-version")
        .output()
        .map_err(|e| anyhow::anyhow!("ffmpeg not available: {}", e))?;

    if !output.status.success() {
        return Err(anyhow::anyhow!("ffmpeg -version failed: {:?}", output.status));
    }
    Ok(())
}

fn ensure_command(name: &str) -> anyhow::Result<()> {
    which::which(name).map_err(|e| anyhow::anyhow!("{} not available: {}", name, e))?;
    Ok(())
}

fn ensure_env_present(vars: &[&str]) -> anyhow::Result<()> {
    for var in vars {
        if std::env::var(var).is_err() {
            return Err(anyhow::anyhow!("missing required env var {}", var));
        }
    }
    Ok(())
}
