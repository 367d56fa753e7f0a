//! Raw Ethernet I/O over Linux packet sockets (`man 7 packet`)

use super::{RxInfo, Transport};
use crate::{Error, Result};
use std::collections::HashMap;
use std::ffi::CString;
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::sync::Arc;
use tokio::io::unix::AsyncFd;

/// Upper bound on how long a send waits for socket buffer space
const SEND_POLL_TIMEOUT_MS: libc::c_int = 100;

fn eth_p_all() -> u16 {
    (libc::ETH_P_ALL as u16).to_be()
}

/// Maps the C convention of a negative return to `errno`.
fn check(ret: libc::c_int) -> io::Result<libc::c_int> {
    if ret < 0 {
        Err(io::Error::last_os_error())
    } else {
        Ok(ret)
    }
}

/// A packet socket bound to one interface in promiscuous mode.
///
/// Reads are driven by the tokio reactor. Writes are plain non-blocking
/// syscalls, which lets the ARP sweeper thread send without a runtime handle.
pub struct AfPacketSocket {
    fd: AsyncFd<OwnedFd>,
    ifindex: i32,
    name: String,
}

impl AfPacketSocket {
    /// Opens a socket on `ifname`. Needs `CAP_NET_RAW` and a running tokio
    /// runtime.
    pub fn bind(ifname: &str) -> Result<Self> {
        let raw = check(unsafe {
            libc::socket(libc::AF_PACKET, libc::SOCK_RAW, eth_p_all() as libc::c_int)
        })?;
        // From here on the descriptor closes itself on every error path
        let owned = unsafe { OwnedFd::from_raw_fd(raw) };
        let fd = owned.as_raw_fd();

        let ifindex = interface_index(fd, ifname)?;

        let mut addr: libc::sockaddr_ll = unsafe { mem::zeroed() };
        addr.sll_family = libc::AF_PACKET as u16;
        addr.sll_protocol = eth_p_all();
        addr.sll_ifindex = ifindex;
        check(unsafe {
            libc::bind(
                fd,
                &addr as *const libc::sockaddr_ll as *const libc::sockaddr,
                mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t,
            )
        })?;

        let flags = check(unsafe { libc::fcntl(fd, libc::F_GETFL) })?;
        check(unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) })?;

        promiscuous(fd, ifindex, true)?;

        // The OwnedFd moves into the AsyncFd and stays open until it drops
        let fd = unsafe { AsyncFd::register(owned) }.map_err(io::Error::from)?;

        Ok(Self {
            fd,
            ifindex,
            name: ifname.to_owned(),
        })
    }

    fn raw(&self) -> RawFd {
        self.fd.get_ref().as_raw_fd()
    }

    /// Waits for the next frame that arrived on the wire.
    ///
    /// Copies of our own transmissions are skipped.
    pub async fn recv(&self, buf: &mut [u8]) -> Result<RxInfo> {
        loop {
            let mut ready = self.fd.readable().await?;

            let result = ready.try_io(|fd| {
                let mut from: libc::sockaddr_ll = unsafe { mem::zeroed() };
                let mut from_len = mem::size_of::<libc::sockaddr_ll>() as libc::socklen_t;
                let n = unsafe {
                    libc::recvfrom(
                        fd.get_ref().as_raw_fd(),
                        buf.as_mut_ptr().cast(),
                        buf.len(),
                        0,
                        (&mut from as *mut libc::sockaddr_ll).cast(),
                        &mut from_len,
                    )
                };
                if n < 0 {
                    return Err(io::Error::last_os_error());
                }
                Ok((n as usize, from.sll_pkttype))
            });

            match result {
                Ok(Ok((_, kind))) if kind == libc::PACKET_OUTGOING as u8 => {}
                Ok(Ok((len, _))) => return Ok(RxInfo { len }),
                Ok(Err(e)) => return Err(e.into()),
                // Spurious wakeup; readiness was cleared by try_io
                Err(_) => {}
            }
        }
    }

    /// Writes one frame, waiting briefly if the socket buffer is full.
    pub fn send(&self, frame: &[u8]) -> io::Result<usize> {
        match self.send_once(frame) {
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                let mut pfd = libc::pollfd {
                    fd: self.raw(),
                    events: libc::POLLOUT,
                    revents: 0,
                };
                check(unsafe { libc::poll(&mut pfd, 1, SEND_POLL_TIMEOUT_MS) })?;
                self.send_once(frame)
            }
            other => other,
        }
    }

    fn send_once(&self, frame: &[u8]) -> io::Result<usize> {
        let n = unsafe { libc::send(self.raw(), frame.as_ptr().cast(), frame.len(), 0) };
        if n < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(n as usize)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for AfPacketSocket {
    fn drop(&mut self) {
        // The descriptor itself is closed by OwnedFd
        if let Err(e) = promiscuous(self.raw(), self.ifindex, false) {
            tracing::debug!(interface = %self.name, "leaving promiscuous mode: {}", e);
        }
    }
}

fn interface_index(fd: RawFd, ifname: &str) -> Result<i32> {
    let unknown = || Error::InterfaceNotFound {
        name: ifname.to_owned(),
    };

    let cname = CString::new(ifname).map_err(|_| unknown())?;
    let cname = cname.as_bytes_with_nul();

    let mut req: libc::ifreq = unsafe { mem::zeroed() };
    if cname.len() > req.ifr_name.len() {
        return Err(unknown());
    }
    for (slot, byte) in req.ifr_name.iter_mut().zip(cname) {
        *slot = *byte as libc::c_char;
    }

    check(unsafe { libc::ioctl(fd, libc::SIOCGIFINDEX, &mut req) }).map_err(|_| unknown())?;
    Ok(unsafe { req.ifr_ifru.ifru_ifindex })
}

fn promiscuous(fd: RawFd, ifindex: i32, on: bool) -> io::Result<()> {
    let mut membership: libc::packet_mreq = unsafe { mem::zeroed() };
    membership.mr_ifindex = ifindex;
    membership.mr_type = libc::PACKET_MR_PROMISC as u16;

    let option = if on {
        libc::PACKET_ADD_MEMBERSHIP
    } else {
        libc::PACKET_DROP_MEMBERSHIP
    };
    check(unsafe {
        libc::setsockopt(
            fd,
            libc::SOL_PACKET,
            option,
            (&membership as *const libc::packet_mreq).cast(),
            mem::size_of::<libc::packet_mreq>() as libc::socklen_t,
        )
    })?;
    Ok(())
}

/// [`Transport`] with one [`AfPacketSocket`] per interface, keyed by name
#[derive(Default)]
pub struct AfPacketTransport {
    sockets: HashMap<String, Arc<AfPacketSocket>>,
}

impl AfPacketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, socket: Arc<AfPacketSocket>) {
        self.sockets.insert(socket.name().to_owned(), socket);
    }
}

impl Transport for AfPacketTransport {
    fn send_frame(&self, interface: &str, frame: &[u8]) -> Result<()> {
        let Some(socket) = self.sockets.get(interface) else {
            return Err(Error::InterfaceNotFound {
                name: interface.to_owned(),
            });
        };

        let send_error = |source| Error::Send {
            interface: interface.to_owned(),
            source,
        };
        let written = socket.send(frame).map_err(send_error)?;
        if written < frame.len() {
            return Err(send_error(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("wrote {} of {} bytes", written, frame.len()),
            )));
        }
        Ok(())
    }
}
