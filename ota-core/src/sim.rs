//! In-memory stand-ins for the storage engine, boot record, filesystem layer
//! and network request. Used by the host tests and by `ota-tool` to dry-run
//! a bundle.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::commit::BootControl;
use crate::error::{CommitError, IoError, IoOp, MountError};
use crate::mount::{RegionMounter, RegionUsage};
use crate::partition::RegionStorage;
use crate::restart::Restart;
use crate::slot::{SLOT_A, SLOT_B, STATIC_ASSETS_LABEL};
use crate::transport::{TransportError, UpdateTransport};

/// Value of an erased flash byte
pub const ERASED: u8 = 0xFF;

#[derive(Debug, Default)]
struct Region {
    data: Vec<u8>,
    erases: usize,
    bytes_read: usize,
    bytes_written: usize,
    fail_write_at: Option<usize>,
    fail_erase: bool,
    flip_on_write: Option<usize>,
}

/// NOR-flash-like regions: erase sets 0xFF, writes can only clear bits.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    regions: Mutex<HashMap<String, Region>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an erased region
    pub fn with_region(self, label: &str, capacity: usize) -> Self {
        self.lock().insert(
            label.to_string(),
            Region {
                data: vec![ERASED; capacity],
                ..Default::default()
            },
        );
        self
    }

    /// Both slots plus the static assets region
    pub fn slot_layout(app_capacity: usize, assets_capacity: usize, static_capacity: usize) -> Self {
        Self::new()
            .with_region(SLOT_A.app_region, app_capacity)
            .with_region(SLOT_B.app_region, app_capacity)
            .with_region(SLOT_A.assets_region, assets_capacity)
            .with_region(SLOT_B.assets_region, assets_capacity)
            .with_region(STATIC_ASSETS_LABEL, static_capacity)
    }

    pub fn contents(&self, label: &str) -> Vec<u8> {
        self.with(label, |r| r.data.clone())
    }

    /// Overwrite the region wholesale, bypassing erase/write accounting
    pub fn preload(&self, label: &str, data: &[u8]) {
        self.with(label, |r| {
            r.data.fill(ERASED);
            r.data[..data.len()].copy_from_slice(data);
        })
    }

    pub fn erase_count(&self, label: &str) -> usize {
        self.with(label, |r| r.erases)
    }

    pub fn bytes_read(&self, label: &str) -> usize {
        self.with(label, |r| r.bytes_read)
    }

    pub fn bytes_written(&self, label: &str) -> usize {
        self.with(label, |r| r.bytes_written)
    }

    pub fn total_erases(&self) -> usize {
        self.lock().values().map(|r| r.erases).sum()
    }

    pub fn total_bytes_written(&self) -> usize {
        self.lock().values().map(|r| r.bytes_written).sum()
    }

    /// Fail the write that covers `offset`
    pub fn fail_writes_at(&self, label: &str, offset: usize) {
        self.with(label, |r| r.fail_write_at = Some(offset))
    }

    pub fn fail_erases(&self, label: &str) {
        self.with(label, |r| r.fail_erase = true)
    }

    /// Store the byte at `offset` with its lowest bit flipped, as a bad cell would
    pub fn flip_on_write(&self, label: &str, offset: usize) {
        self.with(label, |r| r.flip_on_write = Some(offset))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Region>> {
        self.regions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with<T>(&self, label: &str, f: impl FnOnce(&mut Region) -> T) -> T {
        let mut regions = self.lock();
        let region = regions
            .get_mut(label)
            .unwrap_or_else(|| panic!("no region '{label}' in MemoryStorage"));
        f(region)
    }

    fn try_with<T>(
        &self,
        op: IoOp,
        label: &str,
        f: impl FnOnce(&mut Region) -> Result<T, IoError>,
    ) -> Result<T, IoError> {
        let mut regions = self.lock();
        match regions.get_mut(label) {
            Some(region) => f(region),
            None => Err(IoError::new(op, label, "ESP_ERR_NOT_FOUND")),
        }
    }
}

impl RegionStorage for MemoryStorage {
    fn capacity(&self, label: &str) -> Result<usize, IoError> {
        self.try_with(IoOp::Lookup, label, |r| Ok(r.data.len()))
    }

    fn erase(&self, label: &str) -> Result<(), IoError> {
        self.try_with(IoOp::Erase, label, |r| {
            if r.fail_erase {
                return Err(IoError::new(IoOp::Erase, label, "ESP_ERR_FLASH_OP_FAIL"));
            }
            r.data.fill(ERASED);
            r.erases += 1;
            Ok(())
        })
    }

    fn write(&self, label: &str, offset: usize, data: &[u8]) -> Result<(), IoError> {
        self.try_with(IoOp::Write, label, |r| {
            let end = offset + data.len();
            if end > r.data.len() {
                return Err(IoError::new(IoOp::Write, label, "ESP_ERR_INVALID_SIZE"));
            }
            if let Some(at) = r.fail_write_at {
                if (offset..end).contains(&at) {
                    return Err(IoError::new(IoOp::Write, label, "ESP_ERR_FLASH_OP_FAIL"));
                }
            }
            for (i, byte) in data.iter().enumerate() {
                let mut value = *byte;
                if r.flip_on_write == Some(offset + i) {
                    value ^= 0x01;
                }
                r.data[offset + i] &= value;
            }
            r.bytes_written += data.len();
            Ok(())
        })
    }

    fn read(&self, label: &str, offset: usize, buf: &mut [u8]) -> Result<(), IoError> {
        self.try_with(IoOp::Read, label, |r| {
            let end = offset + buf.len();
            if end > r.data.len() {
                return Err(IoError::new(IoOp::Read, label, "ESP_ERR_INVALID_SIZE"));
            }
            buf.copy_from_slice(&r.data[offset..end]);
            r.bytes_read += buf.len();
            Ok(())
        })
    }
}

/// Boot record with a running label and a pending next-boot label
#[derive(Debug)]
pub struct MemoryBoot {
    running: Mutex<String>,
    next: Mutex<String>,
    fail_commits: AtomicBool,
    label_reads: AtomicUsize,
    commits: AtomicUsize,
}

impl MemoryBoot {
    pub fn new(running: &str) -> Self {
        Self {
            running: Mutex::new(running.to_string()),
            next: Mutex::new(running.to_string()),
            fail_commits: AtomicBool::new(false),
            label_reads: AtomicUsize::new(0),
            commits: AtomicUsize::new(0),
        }
    }

    pub fn next_boot_label(&self) -> String {
        self.next.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn fail_commits(&self) {
        self.fail_commits.store(true, Ordering::SeqCst);
    }

    pub fn label_reads(&self) -> usize {
        self.label_reads.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    /// Simulate a restart: the pending label becomes the running one
    pub fn reboot(&self) {
        let next = self.next_boot_label();
        *self.running.lock().unwrap_or_else(|e| e.into_inner()) = next;
    }
}

impl BootControl for MemoryBoot {
    fn running_boot_label(&self) -> Result<String, IoError> {
        self.label_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.running.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn set_boot_label(&self, label: &str) -> Result<(), CommitError> {
        if self.fail_commits.load(Ordering::SeqCst) {
            return Err(CommitError {
                label: label.to_string(),
                detail: "ESP_ERR_OTA_VALIDATE_FAILED".to_string(),
            });
        }
        *self.next.lock().unwrap_or_else(|e| e.into_inner()) = label.to_string();
        self.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Records mounts and serves configured usage figures
#[derive(Debug, Default)]
pub struct MemoryMounter {
    mounts: Mutex<Vec<(String, String)>>,
    failing: Mutex<HashSet<String>>,
    usage: Mutex<HashMap<String, RegionUsage>>,
}

impl MemoryMounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mounts(&self) -> Vec<(String, String)> {
        self.mounts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn fail_mount(&self, label: &str) {
        self.failing
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(label.to_string());
    }

    pub fn set_usage(&self, label: &str, usage: RegionUsage) {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(label.to_string(), usage);
    }
}

impl RegionMounter for MemoryMounter {
    fn mount(&self, label: &str, mount_point: &str) -> Result<(), MountError> {
        if self.failing.lock().unwrap_or_else(|e| e.into_inner()).contains(label) {
            return Err(MountError::Mount {
                label: label.to_string(),
                mount_point: mount_point.to_string(),
                detail: "ESP_FAIL".to_string(),
            });
        }
        self.mounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((label.to_string(), mount_point.to_string()));
        Ok(())
    }

    fn usage(&self, label: &str) -> Result<RegionUsage, IoError> {
        self.usage
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(label)
            .copied()
            .ok_or_else(|| IoError::new(IoOp::Info, label, "ESP_ERR_NOT_FOUND"))
    }
}

/// One scripted outcome of `receive_chunk`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Data(Vec<u8>),
    Timeout,
    Closed,
    Fail(String),
}

/// Request whose body is replayed from a script. Once the script runs out
/// every receive returns `Ok(0)`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    content_length: usize,
    steps: VecDeque<Step>,
    receive_calls: usize,
    bytes_delivered: usize,
    response: Option<(u16, String)>,
}

impl ScriptedTransport {
    pub fn new(content_length: usize) -> Self {
        Self {
            content_length,
            ..Default::default()
        }
    }

    /// Append `body` delivered in pieces of at most `chunk` bytes
    pub fn with_body(mut self, body: &[u8], chunk: usize) -> Self {
        for piece in body.chunks(chunk.max(1)) {
            self.steps.push_back(Step::Data(piece.to_vec()));
        }
        self
    }

    pub fn then(mut self, step: Step) -> Self {
        self.steps.push_back(step);
        self
    }

    pub fn receive_calls(&self) -> usize {
        self.receive_calls
    }

    pub fn bytes_delivered(&self) -> usize {
        self.bytes_delivered
    }

    pub fn response(&self) -> Option<&(u16, String)> {
        self.response.as_ref()
    }
}

impl UpdateTransport for ScriptedTransport {
    fn content_length(&self) -> usize {
        self.content_length
    }

    fn receive_chunk(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize, TransportError> {
        self.receive_calls += 1;
        match self.steps.pop_front() {
            None => Ok(0),
            Some(Step::Data(mut data)) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                if n < data.len() {
                    let rest = data.split_off(n);
                    self.steps.push_front(Step::Data(rest));
                }
                self.bytes_delivered += n;
                Ok(n)
            }
            Some(Step::Timeout) => Err(TransportError::Timeout),
            Some(Step::Closed) => Err(TransportError::Closed),
            Some(Step::Fail(e)) => Err(TransportError::Failed(e)),
        }
    }

    fn send_response(&mut self, status: u16, body: &str) -> Result<(), TransportError> {
        self.response = Some((status, body.to_string()));
        Ok(())
    }
}

/// Restart that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRestart;

impl Restart for NoRestart {
    fn restart(&self) {}
}

/// Restart that counts how often it fired
#[derive(Debug, Default)]
pub struct RecordingRestart {
    fired: AtomicUsize,
}

impl RecordingRestart {
    pub fn fired(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    /// Poll until the restart fired or `timeout` passed
    pub fn wait_fired(&self, timeout: Duration) -> bool {
        let deadline = std::time::Instant::now() + timeout;
        while std::time::Instant::now() < deadline {
            if self.fired() > 0 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        self.fired() > 0
    }
}

impl Restart for RecordingRestart {
    fn restart(&self) {
        self.fired.fetch_add(1, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flash_writes_only_clear_bits() {
        let storage = MemoryStorage::new().with_region("r", 4);
        storage.write("r", 0, &[0x0F]).unwrap();
        storage.write("r", 0, &[0xF0]).unwrap();
        assert_eq!(storage.contents("r")[0], 0x00);

        storage.erase("r").unwrap();
        assert_eq!(storage.contents("r"), vec![ERASED; 4]);
    }

    #[test]
    fn test_out_of_bounds_write_fails() {
        let storage = MemoryStorage::new().with_region("r", 4);
        assert!(storage.write("r", 2, &[0, 0, 0]).is_err());
        assert!(storage.capacity("missing").is_err());
    }

    #[test]
    fn test_scripted_transport_splits_oversized_steps() {
        let mut transport = ScriptedTransport::new(6).then(Step::Data(vec![1, 2, 3, 4, 5, 6]));
        let mut buf = [0u8; 4];
        assert_eq!(transport.receive_chunk(&mut buf, Duration::ZERO), Ok(4));
        assert_eq!(transport.receive_chunk(&mut buf, Duration::ZERO), Ok(2));
        assert_eq!(&buf[..2], &[5, 6]);
        assert_eq!(transport.receive_chunk(&mut buf, Duration::ZERO), Ok(0));
    }
}
