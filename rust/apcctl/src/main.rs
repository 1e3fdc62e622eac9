//! Walk through an agent session against a live Proactive Contact server:
//! dial, log on, optionally take a headset and a job, then print the
//! notification stream until interrupted.

use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use apc::{Client, ClientOptions, IdentityDecoder, JobType, Windows1251Decoder};

#[derive(Debug, Parser)]
#[command(name = "apcctl", about = "Avaya Proactive Contact agent session walkthrough")]
struct Args {
    /// Agent server address, host:port.
    #[arg(long)]
    addr: String,

    /// Agent name to log on with.
    #[arg(long)]
    agent_name: String,

    /// Agent password.
    #[arg(long)]
    password: String,

    /// Headset to reserve and connect after logon.
    #[arg(long)]
    headset_id: Option<u32>,

    /// Job to attach after logon; without it, jobs are listed instead.
    #[arg(long)]
    job_name: Option<String>,

    /// Accept any server certificate (agent servers are usually
    /// self-signed).
    #[arg(long)]
    insecure: bool,

    /// Decode server output as Windows-1251.
    #[arg(long)]
    windows_1251: bool,

    /// Per-read deadline in seconds; unset means no deadline.
    #[arg(long)]
    timeout: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let options = ClientOptions {
        timeout: args.timeout.map(Duration::from_secs),
        decoder: if args.windows_1251 {
            Box::new(Windows1251Decoder)
        } else {
            Box::new(IdentityDecoder)
        },
        tls_skip_verify: args.insecure,
    };

    let (client, driver) = Client::connect(&args.addr, options).await?;
    let driver = tokio::spawn(driver.run());

    client.logon(&args.agent_name, &args.password).await?;
    info!(agent = %args.agent_name, "logged on");

    if let Some(headset_id) = args.headset_id {
        client.reserve_headset(headset_id).await?;
        client.connect_headset().await?;
        info!(headset_id, "headset connected");
    }

    match &args.job_name {
        Some(job_name) => {
            client.attach_job(job_name).await?;
            info!(job = %job_name, "attached");
        }
        None => {
            for job in client.list_jobs(JobType::All).await? {
                info!(
                    name = %job.name,
                    job_type = ?job.job_type,
                    status = ?job.status,
                    "job"
                );
            }
        }
    }

    let mut notifications = client.notifications()?;
    loop {
        tokio::select! {
            maybe = notifications.recv() => match maybe {
                Some(notification) => info!(?notification, "notification"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }
    drop(notifications);

    if client.is_open() {
        if args.job_name.is_some() {
            let _ = client.detach_job().await;
        }
        if args.headset_id.is_some() {
            let _ = client.disconnect_headset().await;
            let _ = client.free_headset().await;
        }
        client.logoff().await?;
    }

    driver.await??;
    Ok(())
}
