//! `policy_matrix` 集成测试：逐项验证三种策略与两种释放时机的组合行为。
//!
//! # 测试目标（Why）
//! - single 策略的独占打开必须立即失败而非阻塞；
//! - 释放策略 `OnClose` 与 `OnShutdown` 都要覆盖，避免只验证其中一种历史行为；
//! - 目录释放幂等，未知身份的读写返回明确的 `NoSuchQueue`。

use std::time::{Duration, Instant};

use spark_fifo::{
    CAPACITY, FifoError, Identity, Multiplexer, MuxConfig, Policy, QueueState, ReleasePolicy,
};

fn mux_with(policy: Policy, release: ReleasePolicy) -> Multiplexer {
    Multiplexer::new(MuxConfig::with_policy(policy).release(release)).expect("构造多路复用器")
}

#[test]
fn single_policy_second_open_is_busy_without_blocking() {
    let mux = mux_with(Policy::Single, ReleasePolicy::OnShutdown);
    let first = mux.open(100).expect("第一次打开");
    let started = Instant::now();
    let second = mux.open(200);
    assert!(started.elapsed() < Duration::from_secs(1), "Busy 必须立即返回");
    assert_eq!(second.map(|_| ()), Err(FifoError::Busy));

    first.write(b"kept").expect("写入");
    first.close();
    let reopened = mux.open(200).expect("关闭后重新打开");
    assert_eq!(reopened.read_bytes(8).expect("读取").as_ref(), b"kept");
}

#[test]
fn single_policy_gate_is_released_on_drop() {
    let mux = mux_with(Policy::Single, ReleasePolicy::OnClose);
    {
        let _only = mux.open(1).expect("打开");
        assert_eq!(mux.open(1).map(|_| ()), Err(FifoError::Busy));
    }
    assert!(mux.open(1).is_ok());
}

#[test]
fn default_policy_allows_concurrent_writers() {
    let mux = mux_with(Policy::Default, ReleasePolicy::OnShutdown);
    let a = mux.open(1).expect("打开 A");
    let b = mux.open(2).expect("打开 B");
    a.write(b"12").expect("A 写入");
    b.write(b"34").expect("B 写入");
    assert_eq!(a.read_bytes(4).expect("读取").as_ref(), b"1234");
}

#[test]
fn multi_policy_reads_are_isolated() {
    let mux = mux_with(Policy::Multi, ReleasePolicy::OnShutdown);
    let a = mux.open(1).expect("打开 A");
    let b = mux.open(2).expect("打开 B");
    a.write(b"secret").expect("A 写入");
    b.write(b"x").expect("B 写入");
    assert_eq!(b.read_bytes(16).expect("B 读取").as_ref(), b"x");
    assert_eq!(mux.queue_len(1), Some(6), "B 的读取不能消耗 A 的数据");
}

#[test]
fn release_on_close_discards_queue_for_every_policy() {
    for policy in [Policy::Default, Policy::Single, Policy::Multi] {
        let mux = mux_with(policy, ReleasePolicy::OnClose);
        let handle = mux.open(9).expect("打开");
        handle.write(b"drop me").expect("写入");
        handle.close();
        assert_eq!(mux.queue_count(), 0, "{policy}: 最后一个句柄关闭后应释放队列");

        let again = mux.open(9).expect("重新打开");
        assert_eq!(mux.queue_len(9), Some(0), "{policy}: 重新打开得到全新空队列");
        drop(again);
    }
}

#[test]
fn release_on_shutdown_keeps_data_between_opens() {
    for policy in [Policy::Default, Policy::Single, Policy::Multi] {
        let mux = mux_with(policy, ReleasePolicy::OnShutdown);
        let handle = mux.open(9).expect("打开");
        handle.write(b"persist").expect("写入");
        handle.close();
        assert_eq!(mux.queue_state(9), Some(QueueState::Closing));

        let again = mux.open(9).expect("重新打开");
        assert_eq!(mux.queue_state(9), Some(QueueState::HasData));
        assert_eq!(again.read_bytes(16).expect("读取").as_ref(), b"persist");
        drop(again);
        assert_eq!(mux.shutdown(), 1, "{policy}: 关停时清扫剩余队列");
    }
}

#[test]
fn release_is_idempotent() {
    let mux = mux_with(Policy::Multi, ReleasePolicy::OnShutdown);
    let handle = mux.open(3).expect("打开");
    handle.write(b"abc").expect("写入");
    assert!(mux.release(3));
    assert!(!mux.release(3), "重复释放是无操作");
    assert!(!mux.release(404), "释放从未创建的身份是无操作");
    assert_eq!(mux.shutdown(), 0);
    assert_eq!(mux.shutdown(), 0, "重复关停是无操作");
}

#[test]
fn unknown_identity_is_reported_not_blocked() {
    let mux = mux_with(Policy::Multi, ReleasePolicy::OnShutdown);
    let handle = mux.open(12).expect("打开");
    assert!(mux.release(12));
    let started = Instant::now();
    assert_eq!(
        handle.read_bytes(4).map(|b| b.len()),
        Err(FifoError::NoSuchQueue {
            identity: Identity::new(12)
        })
    );
    assert_eq!(
        handle.write(b"x"),
        Err(FifoError::NoSuchQueue {
            identity: Identity::new(12)
        })
    );
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn oversize_write_is_short_and_rest_is_rejected() {
    let mux = mux_with(Policy::Multi, ReleasePolicy::OnShutdown);
    let handle = mux.open(1).expect("打开");
    let payload: Vec<u8> = (0..1500u32).map(|i| (i % 256) as u8).collect();
    assert_eq!(handle.write(&payload), Ok(CAPACITY));
    assert_eq!(mux.queue_len(1), Some(CAPACITY));

    let drained = handle.read_bytes(2 * CAPACITY).expect("读取");
    assert_eq!(drained.as_ref(), &payload[..CAPACITY], "被拒绝的 500 字节不能进入队列");
}

#[test]
fn empty_transfers_return_immediately() {
    let mux = mux_with(Policy::Multi, ReleasePolicy::OnShutdown);
    let handle = mux.open(1).expect("打开");
    assert_eq!(handle.write(&[]), Ok(0));
    assert_eq!(handle.read(&mut []), Ok(0));
}

#[test]
fn invalid_configuration_is_refused_at_startup() {
    let config = MuxConfig {
        wait_slice_ms: 0,
        ..MuxConfig::default()
    };
    let err = Multiplexer::new(config).expect_err("零等待切片必须被拒绝");
    assert_eq!(err.code(), "fifo.config.invalid");
    assert_eq!(
        "multiple".parse::<Policy>().map_err(|err| err.code()),
        Err("fifo.config.policy")
    );
}

#[test]
fn stale_handle_close_leaves_reopened_queue_intact() {
    for release in [ReleasePolicy::OnClose, ReleasePolicy::OnShutdown] {
        let mux = mux_with(Policy::Multi, release);
        let old = mux.open(4).expect("打开旧句柄");
        assert!(mux.release(4));
        let fresh = mux.open(4).expect("重新打开");
        fresh.write(b"live").expect("写入");

        old.close();
        assert_eq!(mux.queue_len(4), Some(4), "{release:?}: 旧句柄关闭不能移除新队列");
        assert_eq!(mux.queue_state(4), Some(QueueState::HasData));
        let snapshot = mux.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].handles, 1, "{release:?}: 旧句柄从未登记到新队列");

        assert_eq!(fresh.write(b"x"), Ok(1));
        assert_eq!(fresh.read_bytes(8).expect("读取").as_ref(), b"livex");
    }
}

#[test]
fn stale_handle_reports_missing_queue_after_reopen() {
    let mux = mux_with(Policy::Multi, ReleasePolicy::OnShutdown);
    let old = mux.open(5).expect("打开旧句柄");
    assert!(mux.release(5));
    let fresh = mux.open(5).expect("重新打开");
    fresh.write(b"mine").expect("写入");

    let missing = Err(FifoError::NoSuchQueue {
        identity: Identity::new(5),
    });
    assert_eq!(old.write(b"intruder"), missing);
    assert_eq!(old.read_bytes(8).map(|b| b.len()), missing);
    old.interrupt();
    assert_eq!(fresh.read_bytes(8).expect("读取").as_ref(), b"mine");
}

#[test]
fn closing_one_handle_then_reopening_clears_closing() {
    let mux = mux_with(Policy::Default, ReleasePolicy::OnClose);
    let first = mux.open(1).expect("打开");
    let second = mux.open(2).expect("打开");
    first.close();
    assert_eq!(mux.queue_state(2), Some(QueueState::Closing));
    let third = mux.open(3).expect("打开");
    assert_eq!(mux.queue_state(3), Some(QueueState::Empty));
    assert_eq!(mux.snapshot()[0].handles, 2);
    drop((second, third));
    assert_eq!(mux.queue_count(), 0);
}

#[test]
fn single_access_gate_is_visible_in_diagnostics() {
    let mux = mux_with(Policy::Single, ReleasePolicy::OnShutdown);
    assert!(!mux.single_access_held());
    let handle = mux.open(1).expect("打开");
    assert!(mux.single_access_held());
    handle.close();
    assert!(!mux.single_access_held());

    let multi = mux_with(Policy::Multi, ReleasePolicy::OnShutdown);
    let _handle = multi.open(1).expect("打开");
    assert!(!multi.single_access_held());
}
