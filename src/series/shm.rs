//! 跨进程时间序列实现
//!
//! 把有界日志放进一个命名共享内存段：固定大小的槽环 + 每槽
//! seqlock。写者（单段内串行，由自旋锁字保证）把元素用 bincode
//! 编码进槽；读者无锁读取，靠序号奇偶与槽内存储的时间索引检测
//! 写入中/被套圈的槽。
//!
//! 跨进程没有条件变量可用，等待未来索引时读者以短睡眠轮询
//! （`spin_sleep`，1ms 切片）。这是相对进程内实现的已知降级，
//! 唤醒延迟上限为一个轮询切片。
//!
//! # 段布局
//!
//! ```text
//! Header (64 bytes):
//!   [0:8]    magic  "SERVOLNK" (u64)
//!   [8:12]   version (u32)
//!   [16:24]  history  槽数 (u64)
//!   [24:32]  slot_size 单槽总字节数 (u64)
//!   [32:36]  append 自旋锁字 (AtomicU32, 0=free)
//!   [40:48]  count  至今 append 总数 (AtomicU64)
//!   [48:64]  保留
//! 每槽 (slot_size bytes):
//!   [0:8]    seq (AtomicU64, 奇数=写入中)
//!   [8:16]   time index (u64)
//!   [16:24]  timestamp_ms (f64)
//!   [24:28]  payload 长度 (u32)
//!   [32:..]  payload (bincode)
//! ```

use std::hint;
use std::marker::PhantomData;
use std::ptr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering, fence};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::error::{DataError, SeriesError};
use crate::series::segment::ShmSegment;
use crate::series::{TimeIndex, TimeSeries};
use crate::signal;

const MAGIC: u64 = 0x5345_5256_4f4c_4e4b; // "SERVOLNK"
const VERSION: u32 = 1;

const HEADER_SIZE: usize = 64;
const OFF_MAGIC: usize = 0;
const OFF_VERSION: usize = 8;
const OFF_HISTORY: usize = 16;
const OFF_SLOT_SIZE: usize = 24;
const OFF_LOCK: usize = 32;
const OFF_COUNT: usize = 40;

const SLOT_SEQ: usize = 0;
const SLOT_INDEX: usize = 8;
const SLOT_TIMESTAMP: usize = 16;
const SLOT_LEN: usize = 24;
const SLOT_PAYLOAD: usize = 32;

/// 跨进程轮询切片（无条件变量，读者以此粒度重查）
const POLL_SLICE: Duration = Duration::from_millis(1);

/// 共享内存序列配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShmSeriesConfig {
    /// 历史长度（槽数）
    pub history: usize,
    /// 单槽总字节数（含 32 字节槽头）；会向上取整到 8 的倍数
    pub slot_size: usize,
}

impl Default for ShmSeriesConfig {
    fn default() -> Self {
        Self {
            history: 1000,
            slot_size: 4096,
        }
    }
}

/// 跨进程有界阻塞日志
///
/// 元素类型须可被 bincode 编码；编码后超过槽容量属契约违规，
/// `append` 会 panic（槽大小由创建者通过 [`ShmSeriesConfig`]
/// 设定，附加方从段头读取）。
pub struct ShmTimeSeries<T> {
    segment: ShmSegment,
    history: u64,
    slot_size: usize,
    payload_capacity: usize,
    _marker: PhantomData<fn(T) -> T>,
}

enum SlotRead {
    /// 索引尚未写入
    NotYet,
    /// 槽内容的一致快照
    Value { payload: Vec<u8>, timestamp_ms: f64 },
}

impl<T> ShmTimeSeries<T> {
    /// 创建新段（master 侧）
    pub fn create(name: &str, config: ShmSeriesConfig) -> Result<Self, DataError> {
        let history = config.history.max(1) as u64;
        let slot_size = config.slot_size.next_multiple_of(8);
        if slot_size <= SLOT_PAYLOAD {
            return Err(DataError::SegmentTooSmall {
                actual: slot_size,
                required: SLOT_PAYLOAD + 8,
            });
        }

        let total = HEADER_SIZE + history as usize * slot_size;
        let segment = ShmSegment::create(name, total)?;

        // 段已被 create 清零；填入头部，magic 最后写，附加方以其
        // 判断初始化完成（master 先于 attach 启动由宿主保证）。
        // SAFETY: all offsets are within the freshly created mapping
        // of `total` bytes; no other process can be attached yet.
        unsafe {
            let base = segment.as_ptr();
            ptr::write(base.add(OFF_VERSION) as *mut u32, VERSION);
            ptr::write(base.add(OFF_HISTORY) as *mut u64, history);
            ptr::write(base.add(OFF_SLOT_SIZE) as *mut u64, slot_size as u64);
            ptr::write(base.add(OFF_MAGIC) as *mut u64, MAGIC);
        }

        Ok(Self {
            segment,
            history,
            slot_size,
            payload_capacity: slot_size - SLOT_PAYLOAD,
            _marker: PhantomData,
        })
    }

    /// 附加到已存在的段（非 master 侧）
    ///
    /// 先以头部大小映射读出布局，再按完整大小重新映射。
    pub fn attach(name: &str) -> Result<Self, DataError> {
        let probe = ShmSegment::attach(name, HEADER_SIZE)?;

        // SAFETY: the probe mapping covers the full 64-byte header;
        // these fields are written once by the creator before any
        // reader can see the magic value.
        let (magic, version, history, slot_size) = unsafe {
            let base = probe.as_ptr();
            (
                ptr::read(base.add(OFF_MAGIC) as *const u64),
                ptr::read(base.add(OFF_VERSION) as *const u32),
                ptr::read(base.add(OFF_HISTORY) as *const u64),
                ptr::read(base.add(OFF_SLOT_SIZE) as *const u64),
            )
        };
        drop(probe);

        if magic != MAGIC {
            return Err(DataError::HeaderMismatch(format!(
                "bad magic 0x{magic:016x} in segment '{name}' (not created yet?)"
            )));
        }
        if version != VERSION {
            return Err(DataError::HeaderMismatch(format!(
                "segment '{name}' has version {version}, expected {VERSION}"
            )));
        }
        if history == 0 || slot_size as usize <= SLOT_PAYLOAD {
            return Err(DataError::HeaderMismatch(format!(
                "segment '{name}' has implausible layout (history={history}, slot_size={slot_size})"
            )));
        }

        let total = HEADER_SIZE + history as usize * slot_size as usize;
        let segment = ShmSegment::attach(name, total)?;

        Ok(Self {
            segment,
            history,
            slot_size: slot_size as usize,
            payload_capacity: slot_size as usize - SLOT_PAYLOAD,
            _marker: PhantomData,
        })
    }

    /// 历史长度（槽数）
    pub fn history(&self) -> usize {
        self.history as usize
    }

    fn count(&self) -> &AtomicU64 {
        // SAFETY: OFF_COUNT is 8-aligned inside the page-aligned
        // mapping and within bounds; the word is only ever accessed
        // atomically.
        unsafe { &*(self.segment.as_ptr().add(OFF_COUNT) as *const AtomicU64) }
    }

    fn append_lock(&self) -> &AtomicU32 {
        // SAFETY: same as count(); OFF_LOCK is 4-aligned.
        unsafe { &*(self.segment.as_ptr().add(OFF_LOCK) as *const AtomicU32) }
    }

    fn slot_base(&self, slot: u64) -> *mut u8 {
        // SAFETY: slot < history by construction, so the offset stays
        // within the mapping.
        unsafe {
            self.segment.as_ptr().add(HEADER_SIZE + slot as usize * self.slot_size)
        }
    }

    fn slot_seq(&self, slot: u64) -> &AtomicU64 {
        // SAFETY: the seq word sits at an 8-aligned offset inside the
        // slot and is only accessed atomically.
        unsafe { &*(self.slot_base(slot).add(SLOT_SEQ) as *const AtomicU64) }
    }

    /// 尝试一致读取索引 `index` 所在槽
    fn read_slot(&self, index: TimeIndex) -> Result<SlotRead, SeriesError> {
        loop {
            let count = self.count().load(Ordering::Acquire);
            if index >= count {
                return Ok(SlotRead::NotYet);
            }
            if count - index > self.history {
                return Err(SeriesError::Evicted {
                    index,
                    oldest: count - self.history,
                });
            }

            let slot = index % self.history;
            let seq = self.slot_seq(slot);

            let s1 = seq.load(Ordering::Acquire);
            if s1 & 1 == 1 {
                // 写入进行中
                hint::spin_loop();
                continue;
            }

            // SAFETY: all offsets are inside the slot; the copies may
            // race with a concurrent writer, but any torn read is
            // detected and discarded by the seq re-check below.
            let (stored_index, timestamp_ms, len) = unsafe {
                let base = self.slot_base(slot);
                (
                    ptr::read_volatile(base.add(SLOT_INDEX) as *const u64),
                    ptr::read_volatile(base.add(SLOT_TIMESTAMP) as *const f64),
                    ptr::read_volatile(base.add(SLOT_LEN) as *const u32) as usize,
                )
            };

            if len > self.payload_capacity {
                // 只在撕裂读时可能出现，重查序号后重试
                hint::spin_loop();
                continue;
            }

            let mut payload = vec![0_u8; len];
            // SAFETY: len <= payload_capacity keeps the copy within
            // the slot; torn data is discarded below.
            unsafe {
                ptr::copy_nonoverlapping(
                    self.slot_base(slot).add(SLOT_PAYLOAD),
                    payload.as_mut_ptr(),
                    len,
                );
            }

            fence(Ordering::Acquire);
            let s2 = seq.load(Ordering::Relaxed);
            if s1 != s2 {
                // 读取期间被写者改写，重试
                continue;
            }

            if stored_index != index {
                // 槽已被套圈（新一代数据），原索引等效于被淘汰
                return Err(SeriesError::Evicted {
                    index,
                    oldest: self.count().load(Ordering::Acquire).saturating_sub(self.history),
                });
            }

            return Ok(SlotRead::Value { payload, timestamp_ms });
        }
    }

    fn decode(payload: &[u8]) -> T
    where
        T: DeserializeOwned,
    {
        // seqlock 一致性检查通过后 payload 必然是写者完整编码的
        // 结果；解码失败意味着两侧元素类型不一致，属契约违规。
        bincode::deserialize(payload)
            .expect("shared memory payload does not decode; element types differ between processes?")
    }

    fn blocking_read(&self, index: TimeIndex) -> Result<(Vec<u8>, f64), SeriesError> {
        loop {
            match self.read_slot(index)? {
                SlotRead::Value { payload, timestamp_ms } => return Ok((payload, timestamp_ms)),
                SlotRead::NotYet => {
                    if signal::is_interrupted() {
                        return Err(SeriesError::Interrupted);
                    }
                    spin_sleep::sleep(POLL_SLICE);
                },
            }
        }
    }
}

impl<T> TimeSeries<T> for ShmTimeSeries<T>
where
    T: Serialize + DeserializeOwned + Send,
{
    /// # Panics
    ///
    /// 元素编码后超过槽容量时 panic（契约违规；槽大小由
    /// [`ShmSeriesConfig::slot_size`] 设定）。
    fn append(&self, value: T) -> TimeIndex {
        let payload = bincode::serialize(&value).expect("element failed to serialize");
        assert!(
            payload.len() <= self.payload_capacity,
            "serialized element ({} bytes) exceeds shm slot capacity ({} bytes)",
            payload.len(),
            self.payload_capacity,
        );

        // 追加自旋锁：写者之间串行化（通常只有一个写者，竞争极短）
        let lock = self.append_lock();
        let mut spins = 0_u32;
        while lock
            .compare_exchange_weak(0, 1, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spins += 1;
            if spins % 64 == 0 {
                std::thread::yield_now();
            } else {
                hint::spin_loop();
            }
        }

        let count = self.count().load(Ordering::Relaxed);
        let slot = count % self.history;

        // 时间戳相对上一槽夹紧，保证时间戳列单调不减
        let mut timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs_f64()
            * 1000.0;
        if count > 0 {
            let prev = (count - 1) % self.history;
            // SAFETY: we hold the append lock, so the previous slot is
            // stable; the offset is within the slot.
            let prev_ts = unsafe {
                ptr::read_volatile(self.slot_base(prev).add(SLOT_TIMESTAMP) as *const f64)
            };
            timestamp_ms = timestamp_ms.max(prev_ts);
        }

        let seq = self.slot_seq(slot);
        // `| 1` 兼容上一个写者死在写入中途留下的奇数序号：写入中
        // 恒为奇数，完成后恒为偶数
        let s = seq.load(Ordering::Relaxed) | 1;
        seq.store(s, Ordering::Relaxed); // 奇数：写入开始
        fence(Ordering::Release);

        // SAFETY: we hold the append lock (sole writer of this slot);
        // all offsets and the payload copy stay within the slot.
        unsafe {
            let base = self.slot_base(slot);
            ptr::write_volatile(base.add(SLOT_INDEX) as *mut u64, count);
            ptr::write_volatile(base.add(SLOT_TIMESTAMP) as *mut f64, timestamp_ms);
            ptr::write_volatile(base.add(SLOT_LEN) as *mut u32, payload.len() as u32);
            ptr::copy_nonoverlapping(payload.as_ptr(), base.add(SLOT_PAYLOAD), payload.len());
        }

        seq.store(s + 1, Ordering::Release); // 偶数：写入完成
        self.count().store(count + 1, Ordering::Release);
        lock.store(0, Ordering::Release);

        count
    }

    fn newest_index(&self) -> Option<TimeIndex> {
        self.count().load(Ordering::Acquire).checked_sub(1)
    }

    fn newest_element(&self) -> Result<T, SeriesError> {
        loop {
            let Some(newest) = self.newest_index() else {
                return Err(SeriesError::Empty);
            };
            match self.read_slot(newest) {
                Ok(SlotRead::Value { payload, .. }) => return Ok(Self::decode(&payload)),
                // 刚好被套圈或并发写入推进了 newest，重试
                Ok(SlotRead::NotYet) | Err(SeriesError::Evicted { .. }) => continue,
                Err(e) => return Err(e),
            }
        }
    }

    fn at(&self, index: TimeIndex) -> Result<T, SeriesError> {
        let (payload, _) = self.blocking_read(index)?;
        Ok(Self::decode(&payload))
    }

    fn timestamp_ms(&self, index: TimeIndex) -> Result<f64, SeriesError> {
        let (_, timestamp_ms) = self.blocking_read(index)?;
        Ok(timestamp_ms)
    }

    fn wait_for_index(&self, index: TimeIndex, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            if self.count().load(Ordering::Acquire) > index {
                return true;
            }
            match deadline {
                Some(deadline) if Instant::now() >= deadline => return false,
                _ => {},
            }
            spin_sleep::sleep(POLL_SLICE);
        }
    }

    fn length(&self) -> u64 {
        self.count().load(Ordering::Acquire)
    }
}

impl<T> Drop for ShmTimeSeries<T> {
    fn drop(&mut self) {
        // 段的 munmap/unlink 由 ShmSegment 负责；这里仅提示仍在
        // 写入中的异常情况。
        if self.append_lock().load(Ordering::Relaxed) != 0 {
            warn!(
                segment = self.segment.name(),
                "shm series dropped while append lock is held"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn unique_name(tag: &str) -> String {
        let ts = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
        format!("/servolink_shm_test_{tag}_{ts}")
    }

    fn small_config() -> ShmSeriesConfig {
        ShmSeriesConfig {
            history: 4,
            slot_size: 256,
        }
    }

    #[test]
    fn test_create_append_read() {
        let name = unique_name("basic");
        let series = ShmTimeSeries::<i64>::create(&name, small_config()).unwrap();

        assert_eq!(series.newest_index(), None);
        assert!(matches!(series.newest_element(), Err(SeriesError::Empty)));

        assert_eq!(series.append(10), 0);
        assert_eq!(series.append(20), 1);
        assert_eq!(series.newest_index(), Some(1));
        assert_eq!(series.at(0).unwrap(), 10);
        assert_eq!(series.at(1).unwrap(), 20);
        assert_eq!(series.newest_element().unwrap(), 20);
    }

    #[test]
    fn test_attach_sees_master_writes() {
        let name = unique_name("attach");
        let master = ShmTimeSeries::<String>::create(&name, small_config()).unwrap();
        let attached = ShmTimeSeries::<String>::attach(&name).unwrap();

        master.append("hello".to_string());
        assert!(attached.wait_for_index(0, Duration::from_millis(500)));
        assert_eq!(attached.at(0).unwrap(), "hello");

        // 反向：attach 侧写，master 侧读
        attached.append("back".to_string());
        assert_eq!(master.at(1).unwrap(), "back");
    }

    #[test]
    fn test_attach_missing_fails() {
        assert!(ShmTimeSeries::<i32>::attach("/servolink_shm_never_created").is_err());
    }

    #[test]
    fn test_attach_bad_magic_fails() {
        let name = unique_name("badmagic");
        // 创建一个未按本格式初始化的段
        let _raw = ShmSegment::create(&name, 4096).unwrap();
        let result = ShmTimeSeries::<i32>::attach(&name);
        assert!(matches!(result, Err(DataError::HeaderMismatch(_))));
    }

    #[test]
    fn test_eviction_and_lap_detection() {
        let name = unique_name("evict");
        let series = ShmTimeSeries::<u64>::create(&name, small_config()).unwrap();

        for i in 0..10_u64 {
            series.append(i);
        }
        // 历史 4：索引 0..=5 已被淘汰
        assert!(matches!(series.at(0), Err(SeriesError::Evicted { .. })));
        assert!(matches!(series.at(5), Err(SeriesError::Evicted { .. })));
        assert_eq!(series.at(6).unwrap(), 6);
        assert_eq!(series.at(9).unwrap(), 9);
        assert_eq!(series.length(), 10);
    }

    #[test]
    fn test_wait_for_index_timeout() {
        let name = unique_name("timeout");
        let series = ShmTimeSeries::<i32>::create(&name, small_config()).unwrap();
        let start = Instant::now();
        assert!(!series.wait_for_index(0, Duration::from_millis(30)));
        assert!(start.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_concurrent_writer_reader() {
        let name = unique_name("concurrent");
        let series = Arc::new(
            ShmTimeSeries::<u64>::create(
                &name,
                ShmSeriesConfig {
                    history: 64,
                    slot_size: 256,
                },
            )
            .unwrap(),
        );

        let writer = {
            let series = series.clone();
            thread::spawn(move || {
                for i in 0..500_u64 {
                    series.append(i * 3);
                }
            })
        };

        // 读者跟随最新元素，允许 Evicted（被套圈）但不允许撕裂值
        let reader = {
            let series = series.clone();
            thread::spawn(move || {
                let mut seen = 0_u64;
                while seen < 400 {
                    if let Ok(v) = series.newest_element() {
                        assert_eq!(v % 3, 0, "torn read detected");
                        seen = seen.max(v / 3);
                    }
                }
            })
        };

        writer.join().unwrap();
        reader.join().unwrap();
    }

    #[test]
    fn test_timestamps_monotonic() {
        let name = unique_name("ts");
        let series = ShmTimeSeries::<u8>::create(&name, small_config()).unwrap();
        for i in 0..4 {
            series.append(i);
        }
        let mut last = 0.0;
        for i in 0..4 {
            let ts = series.timestamp_ms(i).unwrap();
            assert!(ts >= last);
            last = ts;
        }
    }

    #[test]
    #[should_panic(expected = "exceeds shm slot capacity")]
    fn test_oversized_element_panics() {
        let name = unique_name("oversize");
        let series = ShmTimeSeries::<Vec<u8>>::create(&name, small_config()).unwrap();
        series.append(vec![0_u8; 1024]);
    }
}
