// ==========================================
// 促销基线估算系统 - 计算闸门（同一基线串行化）
// ==========================================
// 职责: 同一 baseline_id 同时只有一个计算在跑；最新请求取代过期请求
// 机制:
//   - 每个基线一个槽位: run 锁 + 代号(generation)
//   - 每次请求领取一张票（代号 +1），持 run 锁执行
//   - 提交在代号锁内检查票是否仍为最新，过期票不写任何数据
//   - 超时后调用 abandon() 使在途票作废，基线停留在 calculating
// 红线: 不同基线之间互不阻塞
// ==========================================

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::engine::error::{EngineError, EngineResult};

#[derive(Debug, Default)]
struct GateSlot {
    run: Mutex<()>,
    generation: Mutex<u64>,
}

/// 锁中毒时直接取回内部值（槽位只含计数器，不存在不一致状态）
fn lock_slot<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ==========================================
// CalculationGate
// ==========================================
#[derive(Debug, Default)]
pub struct CalculationGate {
    slots: Mutex<HashMap<String, Arc<GateSlot>>>,
}

impl CalculationGate {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, baseline_id: &str) -> Arc<GateSlot> {
        let mut slots = lock_slot(&self.slots);
        slots
            .entry(baseline_id.to_string())
            .or_insert_with(|| Arc::new(GateSlot::default()))
            .clone()
    }

    /// 领取计算票（使此前所有未提交的票过期）
    pub fn issue(&self, baseline_id: &str) -> CalcTicket {
        let slot = self.slot(baseline_id);
        let generation = {
            let mut g = lock_slot(&slot.generation);
            *g += 1;
            *g
        };
        CalcTicket {
            baseline_id: baseline_id.to_string(),
            generation,
            slot,
        }
    }

    /// 作废在途的票（超时处理）
    pub fn abandon(&self, baseline_id: &str) {
        let slot = self.slot(baseline_id);
        let mut g = lock_slot(&slot.generation);
        *g += 1;
        tracing::warn!(baseline_id, generation = *g, "在途计算已作废");
    }
}

// ==========================================
// CalcTicket - 计算票
// ==========================================
#[derive(Debug)]
pub struct CalcTicket {
    baseline_id: String,
    generation: u64,
    slot: Arc<GateSlot>,
}

impl CalcTicket {
    pub fn baseline_id(&self) -> &str {
        &self.baseline_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// 阻塞直到获得该基线的 run 锁
    pub fn acquire(&self) -> MutexGuard<'_, ()> {
        lock_slot(&self.slot.run)
    }

    /// 票仍为最新时在代号锁内执行 f；已过期返回 Superseded
    ///
    /// 检查与写入在同一把锁内完成，abandon() 不会插在两者之间
    pub fn run_if_current<T>(&self, f: impl FnOnce() -> EngineResult<T>) -> EngineResult<T> {
        let g = lock_slot(&self.slot.generation);
        if *g != self.generation {
            return Err(EngineError::Superseded {
                baseline_id: self.baseline_id.clone(),
            });
        }
        let result = f();
        drop(g);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_newer_ticket_supersedes_older() {
        let gate = CalculationGate::new();
        let first = gate.issue("b1");
        let second = gate.issue("b1");

        let err = first.run_if_current(|| Ok(())).unwrap_err();
        assert!(matches!(err, EngineError::Superseded { .. }));
        assert_eq!(second.run_if_current(|| Ok(7)).unwrap(), 7);
    }

    #[test]
    fn test_abandon_invalidates_in_flight_ticket() {
        let gate = CalculationGate::new();
        let ticket = gate.issue("b1");
        gate.abandon("b1");
        assert!(matches!(
            ticket.run_if_current(|| Ok(())),
            Err(EngineError::Superseded { .. })
        ));
    }

    #[test]
    fn test_different_baselines_are_independent() {
        let gate = CalculationGate::new();
        let a = gate.issue("a");
        let b = gate.issue("b");
        let _ga = a.acquire();
        // 不同基线的 run 锁互不阻塞
        let _gb = b.acquire();
        assert_eq!(a.run_if_current(|| Ok(1)).unwrap(), 1);
        assert_eq!(b.run_if_current(|| Ok(2)).unwrap(), 2);
    }

    #[test]
    fn test_same_baseline_runs_are_serialized() {
        let gate = Arc::new(CalculationGate::new());
        let log = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let gate = gate.clone();
                let log = log.clone();
                thread::spawn(move || {
                    let ticket = gate.issue("b1");
                    let _run = ticket.acquire();
                    log.lock().unwrap().push(("start", i));
                    thread::sleep(Duration::from_millis(5));
                    log.lock().unwrap().push(("end", i));
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let log = log.lock().unwrap();
        assert_eq!(log.len(), 8);
        for pair in log.chunks(2) {
            assert_eq!(pair[0].0, "start");
            assert_eq!(pair[1].0, "end");
            assert_eq!(pair[0].1, pair[1].1);
        }
    }
}
