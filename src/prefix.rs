//! IP network prefixes

use crate::error::{MmdbError, Result};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

/// An IP network: an address with its host bits cleared and a prefix length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IpPrefix {
    addr: IpAddr,
    len: u8,
}

impl IpPrefix {
    /// Create a prefix, clearing any host bits of `addr`
    pub fn new(addr: IpAddr, len: u8) -> Result<Self> {
        let max = max_len(&addr);
        if len > max {
            return Err(MmdbError::InvalidPrefix(format!(
                "prefix length {} exceeds {} for {}",
                len, max, addr
            )));
        }
        Ok(Self {
            addr: mask(addr, len),
            len,
        })
    }

    /// The whole address space of `addr`'s family
    pub(crate) fn all(addr: IpAddr) -> Self {
        Self {
            addr: mask(addr, 0),
            len: 0,
        }
    }

    /// Network address
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// Prefix length in bits
    pub fn prefix_len(&self) -> u8 {
        self.len
    }

    /// Whether `ip` lies inside this network
    pub fn contains(&self, ip: IpAddr) -> bool {
        match (self.addr, ip) {
            (IpAddr::V4(_), IpAddr::V4(_)) | (IpAddr::V6(_), IpAddr::V6(_)) => {
                mask(ip, self.len) == self.addr
            }
            _ => false,
        }
    }

    /// Whether this is an IPv4 network
    pub fn is_ipv4(&self) -> bool {
        self.addr.is_ipv4()
    }
}

fn max_len(addr: &IpAddr) -> u8 {
    match addr {
        IpAddr::V4(_) => 32,
        IpAddr::V6(_) => 128,
    }
}

fn mask(addr: IpAddr, len: u8) -> IpAddr {
    match addr {
        IpAddr::V4(v4) => {
            let bits = u32::from(v4);
            let mask = u32::MAX.checked_shl(32 - len as u32).unwrap_or(0);
            IpAddr::V4(Ipv4Addr::from(bits & mask))
        }
        IpAddr::V6(v6) => {
            let bits = u128::from(v6);
            let mask = u128::MAX.checked_shl(128 - len as u32).unwrap_or(0);
            IpAddr::V6(Ipv6Addr::from(bits & mask))
        }
    }
}

impl fmt::Display for IpPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.len)
    }
}

impl FromStr for IpPrefix {
    type Err = MmdbError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || MmdbError::InvalidPrefix(format!("invalid network prefix: {:?}", s));

        let (addr, len) = s.split_once('/').ok_or_else(invalid)?;
        let addr: IpAddr = addr.parse().map_err(|_| invalid())?;
        let len: u8 = len.parse().map_err(|_| invalid())?;
        IpPrefix::new(addr, len)
    }
}

impl From<IpAddr> for IpPrefix {
    /// A single-address network
    fn from(addr: IpAddr) -> Self {
        Self {
            addr,
            len: max_len(&addr),
        }
    }
}
