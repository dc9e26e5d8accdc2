//! Socket pair allocation and worker process spawning.
//!
//! Four `socketpair(AF_UNIX, SOCK_STREAM)` pairs are created up front; the remote ends are
//! inherited by the worker as file descriptors 3-6 (control request/response, payload
//! request/response from the worker's perspective). Everything is closed on every failure path
//! because the local ends are `OwnedFd`s until handed to the channels.

use crate::worker::channel::Channel;
use crate::worker::payload_channel::PayloadChannel;
use async_executor::Executor;
use async_fs::File as AsyncFile;
use async_process::unix::CommandExt;
use async_process::{Child, Command};
use nix::sys::socket::{self, AddressFamily, SockFlag, SockType};
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::Arc;

struct SocketPair {
    local: OwnedFd,
    remote: OwnedFd,
}

fn create_socket_pair() -> io::Result<SocketPair> {
    let (local, remote) = socket::socketpair(
        AddressFamily::Unix,
        SockType::Stream,
        None,
        // Close-on-exec so other children never inherit these; dup2() in pre_exec clears the
        // flag on the descriptors the worker actually uses.
        SockFlag::SOCK_CLOEXEC,
    )?;

    Ok(SocketPair { local, remote })
}

pub(super) struct SpawnResult {
    pub(super) child: Child,
    pub(super) channel: Channel,
    pub(super) payload_channel: PayloadChannel,
}

pub(super) fn spawn_with_worker_channels(
    executor: &Arc<Executor<'static>>,
    command: &mut Command,
) -> io::Result<SpawnResult> {
    let producer_pair = create_socket_pair()?;
    let consumer_pair = create_socket_pair()?;
    let payload_producer_pair = create_socket_pair()?;
    let payload_consumer_pair = create_socket_pair()?;

    let remote_fds: [RawFd; 4] = [
        producer_pair.remote.as_raw_fd(),
        consumer_pair.remote.as_raw_fd(),
        payload_producer_pair.remote.as_raw_fd(),
        payload_consumer_pair.remote.as_raw_fd(),
    ];
    let local_fds: [RawFd; 4] = [
        producer_pair.local.as_raw_fd(),
        consumer_pair.local.as_raw_fd(),
        payload_producer_pair.local.as_raw_fd(),
        payload_consumer_pair.local.as_raw_fd(),
    ];

    fn checked(ret: libc::c_int) -> io::Result<libc::c_int> {
        if ret == -1 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret)
        }
    }

    unsafe {
        command.pre_exec(move || {
            // Duplicate first: with all eight originals still open the duplicates cannot land
            // on descriptors 3-6.
            let mut temporary_fds = [0 as RawFd; 4];
            for (temporary_fd, remote_fd) in temporary_fds.iter_mut().zip(remote_fds) {
                *temporary_fd = checked(libc::dup(remote_fd))?;
            }
            // Unused in the child.
            for fd in remote_fds.into_iter().chain(local_fds) {
                checked(libc::close(fd))?;
            }
            // Now move the duplicates into the descriptor indexes the worker expects.
            for (target_fd, temporary_fd) in (3..7).zip(temporary_fds) {
                checked(libc::dup2(temporary_fd, target_fd))?;
                checked(libc::close(temporary_fd))?;
            }

            Ok(())
        });
    }

    let child = command.spawn()?;
    let pid = child.id();

    // The child owns its duplicates now; our copies of the remote ends close here.
    drop(producer_pair.remote);
    drop(consumer_pair.remote);
    drop(payload_producer_pair.remote);
    drop(payload_consumer_pair.remote);

    let producer_file: AsyncFile = std::fs::File::from(producer_pair.local).into();
    let consumer_file: AsyncFile = std::fs::File::from(consumer_pair.local).into();
    let payload_producer_file: AsyncFile = std::fs::File::from(payload_producer_pair.local).into();
    let payload_consumer_file: AsyncFile = std::fs::File::from(payload_consumer_pair.local).into();

    Ok(SpawnResult {
        child,
        channel: Channel::new(executor, consumer_file, producer_file, pid),
        payload_channel: PayloadChannel::new(
            executor,
            payload_consumer_file,
            payload_producer_file,
            pid,
        ),
    })
}
