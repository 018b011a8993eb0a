use crate::error::ModemError;
use std::io;

/// Byte-level serial link used by the modem driver
pub trait SerialLink: Send {
    fn write_all(&mut self, data: &[u8]) -> Result<(), ModemError>;
    /// Bytes waiting in the input buffer
    fn bytes_available(&mut self) -> Result<usize, ModemError>;
    /// Read whatever is waiting, never blocking
    fn read_available(&mut self) -> Result<Vec<u8>, ModemError>;
    /// Discard unread input
    fn clear_input(&mut self) -> Result<(), ModemError>;
    fn close(&mut self);
}

#[cfg(unix)]
pub use tty::TtySerialLink;

#[cfg(unix)]
mod tty {
    use super::*;
    use std::ffi::CString;
    use std::os::unix::io::RawFd;
    use tracing::{debug, info};

    const WRITE_STALL_MS: libc::c_int = 100;

    /// Raw-mode tty opened through termios
    pub struct TtySerialLink {
        port: String,
        fd: Option<RawFd>,
    }

    impl TtySerialLink {
        pub fn open(port: &str, baud: u32) -> Result<Self, ModemError> {
            let open_failed = |details: String| ModemError::OpenFailed {
                port: port.to_string(),
                details,
            };

            let speed = baud_constant(baud)
                .ok_or_else(|| open_failed(format!("unsupported baud rate {}", baud)))?;
            let path = CString::new(port).map_err(|e| open_failed(e.to_string()))?;

            // SAFETY: path is a valid NUL-terminated string
            let fd = unsafe {
                libc::open(
                    path.as_ptr(),
                    libc::O_RDWR | libc::O_NOCTTY | libc::O_NONBLOCK,
                )
            };
            if fd < 0 {
                return Err(open_failed(io::Error::last_os_error().to_string()));
            }

            let link = Self {
                port: port.to_string(),
                fd: Some(fd),
            };

            // SAFETY: fd is open and termios is fully initialised by tcgetattr
            unsafe {
                let mut tio: libc::termios = std::mem::zeroed();
                if libc::tcgetattr(fd, &mut tio) != 0 {
                    return Err(open_failed(io::Error::last_os_error().to_string()));
                }
                libc::cfmakeraw(&mut tio);
                tio.c_cflag |= libc::CLOCAL | libc::CREAD;
                tio.c_cc[libc::VMIN] = 0;
                tio.c_cc[libc::VTIME] = 0;
                libc::cfsetispeed(&mut tio, speed);
                libc::cfsetospeed(&mut tio, speed);
                if libc::tcsetattr(fd, libc::TCSANOW, &tio) != 0 {
                    return Err(open_failed(io::Error::last_os_error().to_string()));
                }
            }

            info!("Serial port {} opened at {} baud", port, baud);
            Ok(link)
        }

        fn fd(&self) -> Result<RawFd, io::Error> {
            self.fd
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "port closed"))
        }
    }

    impl SerialLink for TtySerialLink {
        fn write_all(&mut self, mut data: &[u8]) -> Result<(), ModemError> {
            let write_failed = |e: io::Error| ModemError::WriteFailed {
                details: e.to_string(),
            };
            let fd = self.fd().map_err(write_failed)?;

            while !data.is_empty() {
                // SAFETY: data points to data.len() readable bytes
                let n = unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) };
                if n < 0 {
                    let err = io::Error::last_os_error();
                    if err.kind() == io::ErrorKind::WouldBlock {
                        wait_writable(fd).map_err(write_failed)?;
                        continue;
                    }
                    return Err(write_failed(err));
                }
                data = &data[n as usize..];
            }
            Ok(())
        }

        fn bytes_available(&mut self) -> Result<usize, ModemError> {
            let fd = self.fd().map_err(read_failed)?;
            let mut waiting: libc::c_int = 0;
            // SAFETY: FIONREAD writes a single c_int
            let rc = unsafe { libc::ioctl(fd, libc::FIONREAD, &mut waiting) };
            if rc < 0 {
                return Err(read_failed(io::Error::last_os_error()));
            }
            Ok(waiting.max(0) as usize)
        }

        fn read_available(&mut self) -> Result<Vec<u8>, ModemError> {
            let waiting = self.bytes_available()?;
            if waiting == 0 {
                return Ok(Vec::new());
            }

            let fd = self.fd().map_err(read_failed)?;
            let mut buf = vec![0u8; waiting];
            // SAFETY: buf has room for buf.len() bytes
            let n = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
            if n < 0 {
                let err = io::Error::last_os_error();
                if err.kind() == io::ErrorKind::WouldBlock {
                    return Ok(Vec::new());
                }
                return Err(read_failed(err));
            }
            buf.truncate(n as usize);
            Ok(buf)
        }

        fn clear_input(&mut self) -> Result<(), ModemError> {
            let fd = self.fd().map_err(read_failed)?;
            // SAFETY: fd is open
            if unsafe { libc::tcflush(fd, libc::TCIFLUSH) } != 0 {
                return Err(read_failed(io::Error::last_os_error()));
            }
            Ok(())
        }

        fn close(&mut self) {
            if let Some(fd) = self.fd.take() {
                // SAFETY: fd was opened by us and is closed exactly once
                unsafe {
                    libc::close(fd);
                }
                debug!("Serial port {} closed", self.port);
            }
        }
    }

    impl Drop for TtySerialLink {
        fn drop(&mut self) {
            self.close();
        }
    }

    /// Wait briefly for room in a full output buffer
    fn wait_writable(fd: RawFd) -> Result<(), io::Error> {
        let mut pollfd = libc::pollfd {
            fd,
            events: libc::POLLOUT,
            revents: 0,
        };
        // SAFETY: pollfd is a single valid entry
        let rc = unsafe { libc::poll(&mut pollfd, 1, WRITE_STALL_MS) };
        match rc {
            rc if rc < 0 => Err(io::Error::last_os_error()),
            0 => Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "output buffer stayed full",
            )),
            _ => Ok(()),
        }
    }

    fn read_failed(e: io::Error) -> ModemError {
        ModemError::ReadFailed {
            details: e.to_string(),
        }
    }

    fn baud_constant(baud: u32) -> Option<libc::speed_t> {
        let speed = match baud {
            1200 => libc::B1200,
            2400 => libc::B2400,
            4800 => libc::B4800,
            9600 => libc::B9600,
            19200 => libc::B19200,
            38400 => libc::B38400,
            57600 => libc::B57600,
            115200 => libc::B115200,
            230400 => libc::B230400,
            _ => return None,
        };
        Some(speed)
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_open_missing_port_fails() {
            let result = TtySerialLink::open("/dev/does-not-exist-coopguard", 9600);
            assert!(matches!(result, Err(ModemError::OpenFailed { .. })));
        }

        /// Opens a pseudo-terminal pair, or None where the host has no ptys
        fn open_pty() -> Option<(RawFd, String)> {
            // SAFETY: plain libc pty setup; the master fd is closed by the caller
            unsafe {
                let master = libc::posix_openpt(libc::O_RDWR | libc::O_NOCTTY);
                if master < 0 {
                    return None;
                }
                if libc::grantpt(master) != 0 || libc::unlockpt(master) != 0 {
                    libc::close(master);
                    return None;
                }
                let name = libc::ptsname(master);
                if name.is_null() {
                    libc::close(master);
                    return None;
                }
                let name = std::ffi::CStr::from_ptr(name).to_string_lossy().into_owned();
                Some((master, name))
            }
        }

        #[test]
        fn test_write_returns_without_waiting_for_reader() {
            let Some((master, slave)) = open_pty() else {
                return;
            };
            let mut link = TtySerialLink::open(&slave, 115200).unwrap();

            let started = std::time::Instant::now();
            link.write_all(b"AT+CMGS=\"+15550100\"\r\n").unwrap();
            assert!(started.elapsed() < std::time::Duration::from_millis(500));

            let mut buf = [0u8; 64];
            // SAFETY: buf has room for buf.len() bytes
            let n = unsafe { libc::read(master, buf.as_mut_ptr().cast(), buf.len()) };
            assert!(n > 0);
            assert_eq!(&buf[..n as usize], b"AT+CMGS=\"+15550100\"\r\n");

            let reply = b"\r\n> ";
            // SAFETY: reply points to reply.len() readable bytes
            unsafe {
                libc::write(master, reply.as_ptr().cast(), reply.len());
            }
            std::thread::sleep(std::time::Duration::from_millis(20));
            assert_eq!(link.read_available().unwrap(), reply.to_vec());

            link.close();
            // SAFETY: master is open and closed once
            unsafe {
                libc::close(master);
            }
        }

        #[test]
        fn test_unsupported_baud_rejected() {
            let result = TtySerialLink::open("/dev/null", 12345);
            assert!(matches!(result, Err(ModemError::OpenFailed { .. })));
        }
    }
}
