//! Append-only file-backed implementation of [`topin_core::LogSink`].
//!
//! Grounded in the original Python server's `LOGGER` function
//! (`examples/original_source/gps_tcp_server.py`): two TSV files under a
//! `logs/` directory, one row per record, flushed immediately. Concurrent
//! writers are serialised with one `tokio::sync::Mutex` per stream so rows
//! from different connection tasks never interleave (`§5`).

use std::path::Path;

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use topin_core::{Direction, InfoRecord, LogSink, LogSinkError, PositionRecord};

const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S";

/// Filename of the raw-frame audit log, relative to the configured log
/// directory.
pub const INFO_LOG_FILE: &str = "server_log.txt";
/// Filename of the decoded-position audit log, relative to the configured
/// log directory.
pub const LOCATION_LOG_FILE: &str = "location_log.txt";

/// Appends [`InfoRecord`] and [`PositionRecord`] rows to two TSV files under
/// a directory, creating both the directory and the files if needed.
pub struct FileLogSink {
    info: Mutex<File>,
    location: Mutex<File>,
}

impl FileLogSink {
    /// Opens (creating if necessary) `server_log.txt` and
    /// `location_log.txt` under `log_dir` in append mode.
    pub async fn open(log_dir: &Path) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(log_dir).await?;
        let info = open_append(&log_dir.join(INFO_LOG_FILE)).await?;
        let location = open_append(&log_dir.join(LOCATION_LOG_FILE)).await?;
        Ok(Self { info: Mutex::new(info), location: Mutex::new(location) })
    }
}

async fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path).await
}

#[async_trait]
impl LogSink for FileLogSink {
    async fn append_info(&self, record: &InfoRecord) -> Result<(), LogSinkError> {
        let direction = match record.direction {
            Direction::In => "IN",
            Direction::Out => "OUT",
        };
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\n",
            record.timestamp.format(TIMESTAMP_FORMAT),
            record.peer_ip,
            record.imei,
            direction,
            record.hex_payload
        );
        let mut file = self.info.lock().await;
        file.write_all(line.as_bytes()).await.map_err(|err| LogSinkError(err.to_string()))?;
        file.flush().await.map_err(|err| LogSinkError(err.to_string()))
    }

    async fn append_position(&self, peer_ip: &str, imei: &str, record: &PositionRecord) -> Result<(), LogSinkError> {
        let line = format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\n",
            record.datetime_local.format(TIMESTAMP_FORMAT),
            peer_ip,
            imei,
            method_str(record.method),
            record.validity,
            opt(record.nb_sat),
            opt_f64(record.latitude),
            opt_f64(record.longitude),
            opt_f64(record.accuracy),
            opt(record.speed_kmh),
            opt(record.heading_degrees),
        );
        let mut file = self.location.lock().await;
        file.write_all(line.as_bytes()).await.map_err(|err| LogSinkError(err.to_string()))?;
        file.flush().await.map_err(|err| LogSinkError(err.to_string()))
    }
}

fn method_str(method: topin_core::PositionMethod) -> &'static str {
    match method {
        topin_core::PositionMethod::Gps => "GPS",
        topin_core::PositionMethod::LbsGsm => "LBS-GSM",
        topin_core::PositionMethod::LbsGsmWifi => "LBS-GSM-WIFI",
        topin_core::PositionMethod::Lbs => "LBS",
    }
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn opt_f64(value: Option<f64>) -> String {
    value.map(|v| format!("{v:.6}")).unwrap_or_default()
}
