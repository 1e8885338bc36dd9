//! Rendezvous IPC through the raw ABI.

mod common;

use common::{TestKernel, RO, RW};
use exokern::mm::{PteFlags, VirtAddr, UTOP};
use exokern::{EnvId, EnvStatus, Syscall, SyscallError};

const NOT_RECV: Option<i32> = Some(SyscallError::IpcNotRecv.code());

fn send(env: EnvId, value: u32, src_va: usize, perm: u32) -> Syscall {
    Syscall::IpcTrySend {
        env,
        value,
        src_va: VirtAddr::new(src_va),
        perm,
    }
}

fn recv(dst_va: usize) -> Syscall {
    Syscall::IpcRecv {
        dst_va: VirtAddr::new(dst_va),
    }
}

#[test]
fn send_before_recv_then_after() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    let sender = t.spawn();
    t.alloc(sender, 0x1000, RW);
    t.write(sender, 0x1000, b"page payload");

    assert_eq!(t.call_as(sender, send(receiver, 0xCAFE, 0x1000, RW)), NOT_RECV);

    // receive blocks and hands the CPU to the sender
    assert_eq!(t.call_as(receiver, recv(0x40_0000)), Some(0));
    assert_eq!(t.kernel.current(), Some(sender));
    assert_eq!(t.kernel.env(receiver).unwrap().status, EnvStatus::NotRunnable);

    assert_eq!(t.call(send(receiver, 0xCAFE, 0x1000, RW)), Some(0));
    let env = t.kernel.env(receiver).unwrap();
    assert_eq!(env.status, EnvStatus::Runnable);
    assert!(!env.ipc.recving);
    assert_eq!(env.ipc.value, 0xCAFE);
    assert_eq!(env.ipc.from, sender);
    assert_eq!(env.ipc.perm, PteFlags::USER_RW);
    // the receiver resumes seeing 0
    assert_eq!(env.frame.return_value(), 0);

    let (src, _) = t.mapping(sender, 0x1000).unwrap();
    let (dst, _) = t.mapping(receiver, 0x40_0000).unwrap();
    assert_eq!(src, dst);
    assert_eq!(t.read(receiver, 0x40_0000, 12), b"page payload");
}

#[test]
fn page_offered_but_not_requested() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    let sender = t.spawn();
    t.alloc(sender, 0x1000, RW);
    let mapped_before = t.kernel.env(receiver).unwrap().space.mapped_pages();

    assert_eq!(t.call_as(receiver, recv(UTOP)), Some(0));
    assert_eq!(t.call_as(sender, send(receiver, 5, 0x1000, RW)), Some(0));

    let env = t.kernel.env(receiver).unwrap();
    assert_eq!(env.ipc.value, 5);
    assert_eq!(env.ipc.perm, PteFlags::empty());
    assert_eq!(env.space.mapped_pages(), mapped_before);
}

#[test]
fn page_requested_but_not_offered() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    let sender = t.spawn();

    assert_eq!(t.call_as(receiver, recv(0x40_0000)), Some(0));
    assert_eq!(t.call_as(sender, send(receiver, 6, UTOP, 0)), Some(0));
    let env = t.kernel.env(receiver).unwrap();
    assert_eq!(env.ipc.value, 6);
    assert_eq!(env.ipc.perm, PteFlags::empty());
    assert!(t.mapping(receiver, 0x40_0000).is_none());
}

#[test]
fn read_only_page_cannot_be_sent_writable() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    let sender = t.spawn();
    t.alloc(sender, 0x1000, RO);

    assert_eq!(t.call_as(receiver, recv(0x40_0000)), Some(0));
    assert_eq!(
        t.call_as(sender, send(receiver, 1, 0x1000, RW)),
        Some(SyscallError::Inval.code())
    );
    // nothing happened; the receiver still waits and a legal send works
    assert!(t.kernel.env(receiver).unwrap().ipc.recving);
    assert!(t.mapping(receiver, 0x40_0000).is_none());
    assert_eq!(t.call(send(receiver, 2, 0x1000, RO)), Some(0));
    assert_eq!(t.mapping(receiver, 0x40_0000).unwrap().1, PteFlags::REQUIRED);
}

#[test]
fn only_the_first_sender_wins() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    let first = t.spawn();
    let second = t.spawn();

    assert_eq!(t.call_as(receiver, recv(UTOP)), Some(0));
    assert_eq!(t.call_as(first, send(receiver, 10, UTOP, 0)), Some(0));
    assert_eq!(t.call_as(second, send(receiver, 20, UTOP, 0)), NOT_RECV);
    let env = t.kernel.env(receiver).unwrap();
    assert_eq!(env.ipc.value, 10);
    assert_eq!(env.ipc.from, first);
}

#[test]
fn misaligned_recv_fails_immediately() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    assert_eq!(t.call_as(receiver, recv(0x40_0010)), Some(SyscallError::Inval.code()));
    assert_eq!(t.kernel.current(), Some(receiver));
    assert_eq!(t.kernel.env(receiver).unwrap().status, EnvStatus::Runnable);
}

#[test]
fn sender_may_target_any_env() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    let stranger = t.spawn();
    assert_eq!(t.call_as(receiver, recv(UTOP)), Some(0));
    // not a parent, not a partner
    assert_eq!(t.call_as(stranger, send(receiver, 3, UTOP, 0)), Some(0));
}

#[test]
fn destroyed_receiver_is_bad_env() {
    let mut t = TestKernel::new();
    let receiver = t.spawn();
    let sender = t.spawn();
    assert_eq!(t.call_as(receiver, recv(UTOP)), Some(0));
    t.kernel.env_destroy(receiver).unwrap();
    assert_eq!(
        t.call_as(sender, send(receiver, 3, UTOP, 0)),
        Some(SyscallError::BadEnv.code())
    );
}
