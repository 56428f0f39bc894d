// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Host interface queries.
//!
//! - Linux: addresses and their DAD/deprecation flags come from
//!   `/proc/net/if_inet6`
//! - Other unix / fallback: `local_ip_address` enumeration, every address
//!   reported as preferred
//!
//! The scope id of a record is the index of the interface it was found on.

use crate::transport::{AddressState, InterfaceAddress, InterfaceQuery};
use std::io;
#[cfg(target_os = "linux")]
use std::net::Ipv6Addr;

/// `IFA_F_DADFAILED` from `linux/if_addr.h`.
#[cfg(target_os = "linux")]
const IFA_F_DADFAILED: u32 = 0x08;
/// `IFA_F_DEPRECATED` from `linux/if_addr.h`.
#[cfg(target_os = "linux")]
const IFA_F_DEPRECATED: u32 = 0x20;
/// `IFA_F_TENTATIVE` from `linux/if_addr.h`.
#[cfg(target_os = "linux")]
const IFA_F_TENTATIVE: u32 = 0x40;

/// Interface queries against the running OS.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemInterfaces;

impl InterfaceQuery for SystemInterfaces {
    fn index_by_name(&self, name: &str) -> io::Result<u32> {
        name_to_index(name)
    }

    fn addresses(&self, interface_index: u32) -> io::Result<Vec<InterfaceAddress>> {
        #[cfg(target_os = "linux")]
        match std::fs::read_to_string("/proc/net/if_inet6") {
            Ok(table) => return Ok(parse_if_inet6(&table, interface_index)),
            Err(e) => {
                log::debug!(
                    "[mesh/if] /proc/net/if_inet6 unreadable ({}), using local_ip_address",
                    e
                );
            }
        }

        addresses_portable(interface_index)
    }
}

#[cfg(unix)]
fn name_to_index(name: &str) -> io::Result<u32> {
    let c_name = std::ffi::CString::new(name).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "interface name contains NUL")
    })?;
    // SAFETY: `c_name` is a valid NUL-terminated string for the whole call.
    let index = unsafe { libc::if_nametoindex(c_name.as_ptr()) };
    if index == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(index)
}

#[cfg(not(unix))]
fn name_to_index(_name: &str) -> io::Result<u32> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface name resolution is only available on unix",
    ))
}

#[cfg(unix)]
fn index_to_name(index: u32) -> io::Result<String> {
    let mut buf = [0 as libc::c_char; libc::IF_NAMESIZE];
    // SAFETY: `buf` holds IF_NAMESIZE bytes as required by if_indextoname.
    let ptr = unsafe { libc::if_indextoname(index, buf.as_mut_ptr()) };
    if ptr.is_null() {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: on success the buffer holds a NUL-terminated name.
    let name = unsafe { std::ffi::CStr::from_ptr(buf.as_ptr()) };
    Ok(name.to_string_lossy().into_owned())
}

#[cfg(unix)]
fn addresses_portable(interface_index: u32) -> io::Result<Vec<InterfaceAddress>> {
    use std::net::IpAddr;

    let name = index_to_name(interface_index)?;
    let interfaces = local_ip_address::list_afinet_netifas()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;

    let addrs: Vec<InterfaceAddress> = interfaces
        .into_iter()
        .filter(|(ifname, _)| *ifname == name)
        .map(|(_, ip)| InterfaceAddress {
            addr: ip,
            scope_id: match ip {
                IpAddr::V6(_) => interface_index,
                IpAddr::V4(_) => 0,
            },
            state: AddressState::Preferred,
        })
        .collect();

    log::debug!(
        "[mesh/if] {} address(es) on {} (portable)",
        addrs.len(),
        name
    );
    Ok(addrs)
}

#[cfg(not(unix))]
fn addresses_portable(_interface_index: u32) -> io::Result<Vec<InterfaceAddress>> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "interface address query is only available on unix",
    ))
}

/// Map `IFA_F_*` flags to an address state.
#[cfg(target_os = "linux")]
fn state_from_flags(flags: u32) -> AddressState {
    if flags & (IFA_F_TENTATIVE | IFA_F_DADFAILED) != 0 {
        AddressState::Tentative
    } else if flags & IFA_F_DEPRECATED != 0 {
        AddressState::Deprecated
    } else {
        AddressState::Preferred
    }
}

/// Parse `/proc/net/if_inet6`, keeping rows for `interface_index`.
///
/// Row layout: `addr ifindex prefixlen scope flags name`, all hex except the
/// name. Unparseable rows are skipped.
#[cfg(target_os = "linux")]
fn parse_if_inet6(table: &str, interface_index: u32) -> Vec<InterfaceAddress> {
    table
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            let addr_hex = fields.next()?;
            let index = u32::from_str_radix(fields.next()?, 16).ok()?;
            let _prefix_len = fields.next()?;
            let _scope = fields.next()?;
            let flags = u32::from_str_radix(fields.next()?, 16).ok()?;
            if index != interface_index || addr_hex.len() != 32 {
                return None;
            }
            let bits = u128::from_str_radix(addr_hex, 16).ok()?;
            Some(InterfaceAddress::v6(
                Ipv6Addr::from(bits),
                index,
                state_from_flags(flags),
            ))
        })
        .collect()
}
