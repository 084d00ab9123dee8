use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::DateTime;
use clap::Parser;

use hornet::{Config, Engine, EvId, Handler, Property, Registry, ValId};

#[derive(Parser)]
#[command(name = "hornet")]
#[command(author, version, about = "Streaming packet inspection with TCP session tracking")]
pub struct Cli {
    /// Read packets from a pcap format file
    #[arg(short = 'r', long, value_name = "FILE")]
    pub read_file: Option<PathBuf>,

    /// Capture packets live on an interface
    #[arg(short = 'i', long, value_name = "DEV")]
    pub interface: Option<String>,

    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,
}

/// Prints TCP session events with their derived attributes.
#[derive(Clone)]
struct DumpHandler {
    v_to_server: ValId,
    v_server_stat: ValId,
    v_client_stat: ValId,
    v_seg: ValId,
}

impl DumpHandler {
    fn new(reg: &Registry) -> hornet::Result<Self> {
        Ok(Self {
            v_to_server: reg.lookup_value_id("tcp_ssn.to_server")?,
            v_server_stat: reg.lookup_value_id("tcp_ssn.server_stat")?,
            v_client_stat: reg.lookup_value_id("tcp_ssn.client_stat")?,
            v_seg: reg.lookup_value_id("tcp_ssn.segment")?,
        })
    }
}

impl Handler for DumpHandler {
    fn recv(&mut self, ev: EvId, p: &Property, reg: &Registry) {
        let ts = DateTime::from_timestamp(p.tv_sec(), 0)
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| p.tv_sec().to_string());
        let event = reg.event_name(ev).unwrap_or("?");

        let src = p
            .src_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "?".to_string());
        let dst = p
            .dst_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "?".to_string());
        let to_server = p.get_u8(self.v_to_server) == Some(1);
        let server = reg.repr(self.v_server_stat, p).unwrap_or_default();
        let client = reg.repr(self.v_client_stat, p).unwrap_or_default();
        let seg = p.get_bytes(self.v_seg).map(|s| s.len()).unwrap_or(0);

        println!(
            "[{}] {} {}:{} {} {}:{} client={} server={} seg={}B",
            ts,
            event,
            src,
            p.src_port(),
            if to_server { "->" } else { "<-" },
            dst,
            p.dst_port(),
            client,
            server,
            seg,
        );
    }
}

pub fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => {
            if Path::new("hornet.toml").exists() {
                Config::from_file("hornet.toml").context("loading hornet.toml")?
            } else {
                Config::default()
            }
        }
    };

    let mut engine = match (&cli.read_file, &cli.interface) {
        (Some(path), None) => Engine::from_file(&path.to_string_lossy(), &config)
            .with_context(|| format!("opening {}", path.display()))?,
        (None, Some(dev)) => Engine::from_device(dev, &config)
            .with_context(|| format!("opening device {}", dev))?,
        _ => bail!("specify a pcap file (-r) or an interface (-i)"),
    };

    let nd = engine.netdec_mut();
    let dump = DumpHandler::new(nd.registry())?;
    nd.bind_handler("tcp_ssn.established", Box::new(dump.clone()))?;
    nd.bind_handler("tcp_ssn.data", Box::new(dump))?;

    let stats = engine.run()?;
    println!("{} packets, {} bytes", stats.packets, stats.bytes);

    Ok(())
}
