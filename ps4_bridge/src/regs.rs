//! Bridge chip registers with known meaning
//!
//! Most of the addresses used by the sequences are undocumented and appear
//! as bare numbers there.

pub const TSYSCTRL: u16 = 0x7005;
pub const TSYSCTRL_HDMI: u8 = 1 << 7;

pub const TSRST: u16 = 0x7006;
pub const TSRST_ENCSRST: u8 = 1 << 1;
pub const TSRST_HDCPSRST: u8 = 1 << 4;

pub const TMONREG: u16 = 0x7008;
pub const TMONREG_HPD: u8 = 1 << 3;

pub const TDPCMODE: u16 = 0x7009;

pub const UPDCTRL: u16 = 0x7011;
pub const UPDCTRL_ALLUPD: u8 = 1 << 7;
pub const UPDCTRL_AVIIUPD: u8 = 1 << 6;
pub const UPDCTRL_CLKUPD: u8 = 1 << 4;
pub const UPDCTRL_VIFUPD: u8 = 1 << 2;
pub const UPDCTRL_CSCUPD: u8 = 1 << 0;

pub const VINCNT: u16 = 0x7040;
pub const VINCNT_VIF_FILEN: u8 = 1 << 6;

pub const VMUTECNT: u16 = 0x705f;
pub const VMUTECNT_LINEWIDTH_90: u8 = 1 << 4;
pub const VMUTECNT_VMUTE_MUTE_NORMAL: u8 = 2;

pub const CSCMOD: u16 = 0x70c0;
pub const C420SET: u16 = 0x70c2;
pub const OUTWSET: u16 = 0x70c3;

pub const PKTENA: u16 = 0x7202;

pub const INFENA: u16 = 0x7203;
pub const INFENA_AVIEN: u8 = 1 << 6;

pub const AKESTA: u16 = 0x7a84;
pub const AKESTA_BUSY: u8 = 1 << 0;

pub const AKESRST: u16 = 0x7a88;

pub const HDCPEN: u16 = 0x7a8b;
pub const HDCPEN_ENC_DIS: u8 = 0x05;

/// Start of the DisplayPort link status block read before enabling
pub const DP_STATUS: u16 = 0x76e1;
