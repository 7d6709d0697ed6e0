use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 连接名额计数 / Live connection slot counter
#[derive(Debug)]
pub struct ConnectionSlots {
    live: AtomicUsize,
    max: usize,
}

/// 名额占用凭证，释放时归还 / Held slot, returned on drop
#[derive(Debug)]
pub struct SlotGuard {
    slots: Arc<ConnectionSlots>,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.live.fetch_sub(1, Ordering::AcqRel);
    }
}

impl ConnectionSlots {
    pub fn new(max: usize) -> Arc<Self> {
        Arc::new(Self {
            live: AtomicUsize::new(0),
            max,
        })
    }

    /// 原子地占用一个名额，已满返回 None / Reserve a slot atomically; `None` when full
    pub fn try_acquire(self: &Arc<Self>) -> Option<SlotGuard> {
        self.live
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |live| {
                (live < self.max).then_some(live + 1)
            })
            .ok()
            .map(|_| SlotGuard {
                slots: Arc::clone(self),
            })
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::Acquire)
    }

    pub fn max(&self) -> usize {
        self.max
    }
}

/// 从查询串读取 user_id / Read `user_id` from the request query
pub fn parse_user_id(query: Option<&str>) -> Result<i64, String> {
    let query = query.ok_or_else(|| "missing user_id".to_string())?;
    let raw = query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "user_id")
        .map(|(_, value)| value)
        .ok_or_else(|| "missing user_id".to_string())?;
    let decoded = urlencoding::decode(raw).map_err(|e| format!("invalid user_id: {}", e))?;
    match decoded.trim().parse::<i64>() {
        Ok(0) => Err("user_id must be non-zero".to_string()),
        Ok(id) => Ok(id),
        Err(_) => Err(format!("user_id is not an integer: {}", decoded)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_are_bounded_and_released() {
        let slots = ConnectionSlots::new(2);
        let a = slots.try_acquire().unwrap();
        let _b = slots.try_acquire().unwrap();
        assert!(slots.try_acquire().is_none());
        assert_eq!(slots.live(), 2);
        drop(a);
        assert_eq!(slots.live(), 1);
        assert!(slots.try_acquire().is_some());
    }

    #[test]
    fn test_zero_max_rejects_everything() {
        let slots = ConnectionSlots::new(0);
        assert!(slots.try_acquire().is_none());
    }

    #[test]
    fn test_parse_user_id() {
        assert_eq!(parse_user_id(Some("user_id=42")), Ok(42));
        assert_eq!(parse_user_id(Some("x=1&user_id=%2D5")), Ok(-5));
        assert!(parse_user_id(None).is_err());
        assert!(parse_user_id(Some("user=1")).is_err());
        assert!(parse_user_id(Some("user_id=abc")).is_err());
        assert!(parse_user_id(Some("user_id=0")).is_err());
    }
}
