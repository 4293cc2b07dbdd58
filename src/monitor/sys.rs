//! Descriptor readiness and HID feature reports on top of nix

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg};
use nix::poll::{poll, PollFd, PollFlags};
use std::io;
use std::os::unix::io::{AsRawFd, BorrowedFd, RawFd};
use std::time::Duration;

// HIDIOCSFEATURE(len): _IOC(_IOC_WRITE | _IOC_READ, 'H', 0x06, len)
nix::ioctl_readwrite_buf!(hid_set_feature, b'H', 0x06, u8);

/// Readiness flags of one descriptor after a poll round
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Readiness {
    pub readable: bool,
    pub hangup: bool,
    pub error: bool,
    /// The descriptor is not open (`POLLNVAL`)
    pub invalid: bool,
}

impl Readiness {
    fn from_flags(flags: PollFlags) -> Self {
        Self {
            readable: flags.contains(PollFlags::POLLIN),
            hangup: flags.contains(PollFlags::POLLHUP),
            error: flags.contains(PollFlags::POLLERR),
            invalid: flags.contains(PollFlags::POLLNVAL),
        }
    }

    /// The descriptor can no longer deliver data and should be dropped
    pub fn is_dead(&self) -> bool {
        self.invalid || ((self.hangup || self.error) && !self.readable)
    }
}

/// Waits up to `timeout` on every descriptor in `fds`.
///
/// An interrupted wait is reported as "nothing ready" rather than an error.
pub fn poll_many(fds: &[BorrowedFd<'_>], timeout: Duration) -> io::Result<Vec<Readiness>> {
    let mut pollfds: Vec<PollFd<'_>> = fds
        .iter()
        .map(|&fd| PollFd::new(fd, PollFlags::POLLIN))
        .collect();
    let timeout_ms = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);

    match poll(&mut pollfds, timeout_ms) {
        Ok(_) => Ok(pollfds
            .iter()
            .map(|p| Readiness::from_flags(p.revents().unwrap_or(PollFlags::empty())))
            .collect()),
        Err(Errno::EINTR) => Ok(vec![Readiness::default(); fds.len()]),
        Err(errno) => Err(errno.into()),
    }
}

/// Waits up to `timeout` for `fd` to become readable.
pub fn wait_readable(fd: BorrowedFd<'_>, timeout: Duration) -> io::Result<bool> {
    let readiness = poll_many(&[fd], timeout)?;
    match readiness.first() {
        Some(r) if r.invalid => Err(Errno::EBADF.into()),
        Some(r) if r.readable => Ok(true),
        Some(r) if r.hangup || r.error => Err(Errno::ENODEV.into()),
        _ => Ok(false),
    }
}

/// Whether `fd` still refers to an open file description.
pub fn descriptor_is_open(fd: RawFd) -> bool {
    fcntl(fd, FcntlArg::F_GETFD).is_ok()
}

/// Sends `report` with `HIDIOCSFEATURE`; the first byte is the report/command id.
pub fn send_feature_report(fd: BorrowedFd<'_>, report: &[u8]) -> io::Result<()> {
    let mut buf = report.to_vec();
    // The buffer outlives the call and its length is encoded in the request.
    unsafe { hid_set_feature(fd.as_raw_fd(), &mut buf) }?;
    Ok(())
}
