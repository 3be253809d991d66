/*
 * Created on Sat Apr 20 2024
 *
 * This file is a part of Stattree
 * Stattree is a free and open-source in-process telemetry registry written by
 * Sayan Nandan ("the Author") with the vision to expose live statistics
 * sources and metric tables through a simple virtual filesystem surface.
 *
 * Copyright (c) 2024, Sayan Nandan <nandansayan@outlook.com>
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

use crate::error::{StatError, StatResult};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
/// Options applied to the mount root. Parsed from the comma-separated
/// `uid=<u>,gid=<g>,mode=<octal>` string a host passes at mount time.
/// Unknown keys are ignored; a malformed value for a known key is an
/// [`StatError::InvalidArgument`].
pub struct MountOptions {
    pub uid: u32,
    pub gid: u32,
    pub mode: u16,
}

impl MountOptions {
    const DEFAULT_ROOT_MODE: u16 = 0o700;
    const MODE_MASK: u16 = 0o7777;
    pub const fn new() -> Self {
        Self {
            uid: 0,
            gid: 0,
            mode: Self::DEFAULT_ROOT_MODE,
        }
    }
    pub fn parse(options: &str) -> StatResult<Self> {
        let mut ret = Self::new();
        for item in options.split(',') {
            let item = item.trim();
            if item.is_empty() {
                continue;
            }
            match item.split_once('=') {
                Some(("uid", v)) => {
                    ret.uid = v.parse().map_err(|_| StatError::InvalidArgument)?
                }
                Some(("gid", v)) => {
                    ret.gid = v.parse().map_err(|_| StatError::InvalidArgument)?
                }
                Some(("mode", v)) => {
                    let mode =
                        u16::from_str_radix(v, 8).map_err(|_| StatError::InvalidArgument)?;
                    if mode & !Self::MODE_MASK != 0 {
                        return Err(StatError::InvalidArgument);
                    }
                    ret.mode = mode;
                }
                // unknown options are not ours to reject
                _ => log::debug!("ignoring unknown mount option `{item}`"),
            }
        }
        Ok(ret)
    }
}

impl Default for MountOptions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{MountOptions, StatError};

    #[test]
    fn parse_all_known() {
        let opts = MountOptions::parse("uid=1000,gid=50,mode=0755").unwrap();
        assert_eq!(
            opts,
            MountOptions {
                uid: 1000,
                gid: 50,
                mode: 0o755
            }
        );
    }
    #[test]
    fn parse_unknown_ignored() {
        let opts = MountOptions::parse("uid=7,whatever=42,flag").unwrap();
        assert_eq!(opts.uid, 7);
        assert_eq!(opts.mode, 0o700);
    }
    #[test]
    fn parse_empty_is_default() {
        assert_eq!(MountOptions::parse("").unwrap(), MountOptions::new());
    }
    #[test]
    fn parse_bad_known_value() {
        assert_eq!(
            MountOptions::parse("uid=root").unwrap_err(),
            StatError::InvalidArgument
        );
        assert_eq!(
            MountOptions::parse("mode=99").unwrap_err(),
            StatError::InvalidArgument
        );
    }
}
