//! Register sequences for the two bridge chips
//!
//! Each function appends one batch to `q`; the caller executes it.

use crate::regs::*;
use icc_cmdqueue::CommandQueue;

/// Silences InfoFrames and resets HDCP before a mode change
pub fn pre_enable(q: &mut CommandQueue) {
    q.write_reg(INFENA, 0x00);
    q.write_reg(TSRST, TSRST_ENCSRST | TSRST_HDCPSRST);
    q.write_reg(TSRST, HDCPEN_ENC_DIS);
    q.write_reg(AKESRST, 0xff);
    q.wait_clear(AKESTA, AKESTA_BUSY);
}

/// Mutes video and stops InfoFrames
pub fn disable(q: &mut CommandQueue) {
    q.write_reg(VMUTECNT, VMUTECNT_LINEWIDTH_90 | VMUTECNT_VMUTE_MUTE_NORMAL);
    q.write_reg(INFENA, 0x00);
}

/// MN86471A mode programming; `dp` is the link status read from [`DP_STATUS`]
pub fn mn86471a_mode(q: &mut CommandQueue, dp: [u8; 3], vic: u8) {
    q.wait_set(0x761e, 0x77);
    q.wait_set(0x761f, 0x77);
    q.wait_set(0x7669, 0x01);
    q.write_reg(0x76d9, (dp[0] & 0x1f) | (dp[0] << 5));
    q.write_reg(
        0x76da,
        (dp[1] & 0x7c) | ((dp[0] >> 3) & 3) | ((dp[1] << 5) & 0x80),
    );
    q.write_reg(0x76db, 0x80 | ((dp[1] >> 3) & 0xf));
    q.write_reg(0x76e4, 0x01);
    q.write_reg(TSYSCTRL, TSYSCTRL_HDMI);
    q.write_reg(VINCNT, VINCNT_VIF_FILEN);
    q.write_reg(0x7071, 0);
    q.write_reg(0x7062, vic);
    q.write_reg(0x765a, 0);
    q.write_reg(0x7062, vic | 0x80);
    q.write_reg(0x7215, 0x28); // aspect
    q.write_reg(0x7217, vic);
    q.write_reg(0x7218, 0);
    q.write_reg(CSCMOD, 0xdc);
    q.write_reg(C420SET, 0xaa);
    q.write_reg(TDPCMODE, 0x4a);
    q.write_reg(OUTWSET, 0x00);
    q.write_reg(0x70c4, 0x08);
    q.write_reg(0x70c5, 0x08);
    q.write_reg(0x7096, 0xff);
    q.write_reg(0x7027, 0x00);
    q.write_reg(0x7020, 0x20);
    q.write_reg(0x700b, 0x01);
    q.write_reg(PKTENA, 0x20);
    q.write_reg(0x7096, 0xff);
    q.write_reg(INFENA, INFENA_AVIEN);
    q.write_reg(
        UPDCTRL,
        UPDCTRL_ALLUPD | UPDCTRL_AVIIUPD | UPDCTRL_CLKUPD | UPDCTRL_VIFUPD | UPDCTRL_CSCUPD,
    );
    q.wait_set(0x7096, 0x80);

    q.mask(0x7216, 0x00, 0x80);
    q.write_reg(0x7218, 0x00);

    q.write_reg(0x7096, 0xff);
    q.write_reg(VMUTECNT, VMUTECNT_LINEWIDTH_90 | VMUTECNT_VMUTE_MUTE_NORMAL);
    q.write_reg(0x7016, 0x04);
    q.write_reg(0x7a88, 0xff);
    q.write_reg(0x7a83, 0x88);
    q.write_reg(0x7204, 0x40);

    q.wait_set(0x7096, 0x80);

    q.write_reg(0x7006, 0x02);
    q.write_reg(0x7020, 0x21);
    q.write_reg(0x7a8b, 0x00);
    q.write_reg(0x7020, 0x21);

    q.write_reg(VMUTECNT, VMUTECNT_LINEWIDTH_90);
}

/// MN86471A HDMI audio, first half
pub fn mn86471a_audio_setup(q: &mut CommandQueue) {
    q.write_reg(0x70b3, 0x00);
    q.write_reg(0x70b7, 0x0b);
    q.write_reg(0x70a8, 0x24);

    q.mask(0x70b9, 0x06, 0x06);
    q.mask(0x70b6, 0x02, 0x0f);
    q.mask(0x70ba, 0x40, 0x70);
    q.mask(0x70b2, 0x20, 0xe0);
    q.mask(0x7257, 0x00, 0xff);
    q.mask(0x70b0, 0x01, 0x21);
    q.mask(0x70ba, 0x00, 0x88);
    q.mask(0x70b9, 0x01, 0x01);
}

/// MN86471A HDMI audio, second half
pub fn mn86471a_audio_enable(q: &mut CommandQueue) {
    q.write_reg(0x7ed8, 0x01);

    q.mask(0x70b4, 0x00, 0x3e);
    q.mask(0x70b5, 0x79, 0xff);
    q.mask(0x70ab, 0x00, 0xff);
    q.mask(0x70b6, 0x02, 0x3f);
    q.mask(0x70b7, 0x0b, 0x0f);
    q.mask(0x70ac, 0x00, 0xff);
    q.mask(0x70bd, 0x00, 0xff);

    q.write_reg(0x7204, 0x10);
    q.write_reg(0x7011, 0xa2);

    q.wait_set(0x7096, 0x80);
    q.write_reg(0x7096, 0xff);

    q.mask(0x7203, 0x10, 0x10);
    q.write_reg(0x70b1, 0xc0);
}

/// MN864729 mode programming
///
/// `cuh12xx` selects the 0x10c5 value later CUH-12xx boards need.
pub fn mn864729_mode(q: &mut CommandQueue, vic: u8, cuh12xx: bool) {
    q.mask(0x6005, 0x01, 0x01);
    q.write_reg(0x6a03, 0x47);

    q.wait_set(0x60f8, 0xff);
    q.wait_set(0x60f9, 0x01);
    q.write_reg(0x6a01, 0x4d);
    q.wait_set(0x60f9, 0x1a);

    q.mask(0x1e00, 0x00, 0x21);
    q.mask(0x1e02, 0x00, 0x70);
    q.delay(0x012c);
    q.write_reg(0x6020, 0x00);
    q.delay(0x0032);
    q.write_reg(0x7402, 0x1c);
    q.write_reg(0x6020, 0x04);
    q.write_reg(TSYSCTRL, TSYSCTRL_HDMI);
    q.write_reg(0x10c7, 0x38);
    q.write_reg(0x1e02, 0x88);
    q.write_reg(0x1e00, 0x66);
    q.write_reg(0x100c, 0x01);
    q.write_reg(TSYSCTRL, TSYSCTRL_HDMI);

    q.write_reg(0x7009, 0x00);
    q.write_reg(0x7040, 0x42);
    q.write_reg(0x7225, 0x28);
    q.write_reg(0x7227, vic);
    q.write_reg(0x7228, 0x00);
    q.write_reg(0x7070, vic);
    q.write_reg(0x7071, vic | 0x80);
    q.write_reg(0x7072, 0x00);
    q.write_reg(0x7073, 0x00);
    q.write_reg(0x7074, 0x00);
    q.write_reg(0x7075, 0x00);
    q.write_reg(0x70c4, 0x0a);
    q.write_reg(0x70c5, 0x0a);
    q.write_reg(0x70c2, 0x00);
    q.write_reg(0x70fe, 0x12);
    q.write_reg(0x70c3, 0x10);
    q.write_reg(0x10c5, if cuh12xx { 0x03 } else { 0x00 });
    q.write_reg(0x10f6, 0xff);
    q.write_reg(0x7202, 0x20);
    q.write_reg(0x7203, 0x60);
    q.write_reg(0x7011, 0xd5);

    q.wait_set(0x10f6, 0x80);
    q.mask(0x7226, 0x00, 0x80);
    q.mask(0x7228, 0x00, 0xff);
    q.delay(0x012c);
    q.write_reg(0x7204, 0x40);
    q.wait_clear(0x7204, 0x40);
    q.write_reg(0x7a8b, 0x05);
    q.mask(0x1e02, 0x70, 0x70);
    q.mask(0x1034, 0x02, 0x02);
    q.mask(0x1e00, 0x01, 0x01);
    q.write_reg(VMUTECNT, VMUTECNT_LINEWIDTH_90);
    q.write_reg(HDCPEN, 0x00);
}

/// MN864729 HDMI audio, first half
pub fn mn864729_audio_setup(q: &mut CommandQueue) {
    q.write_reg(0x70aa, 0x00);
    q.write_reg(0x70af, 0x07);
    q.write_reg(0x70a9, 0x5a);

    q.mask(0x70af, 0x06, 0x06);
    q.mask(0x70af, 0x02, 0x0f);
    q.mask(0x70b3, 0x02, 0x0f);
    q.mask(0x70ae, 0x80, 0xe0);
    q.mask(0x70ae, 0x01, 0x07);
    q.mask(0x70ac, 0x01, 0x21);
    q.mask(0x70ab, 0x80, 0x88);
    q.mask(0x70a9, 0x01, 0x01);
}

/// MN864729 HDMI audio, second half
pub fn mn864729_audio_enable(q: &mut CommandQueue) {
    q.write_reg(0x70b0, 0x01);
    q.mask(0x70b0, 0x00, 0xff);
    q.mask(0x70b1, 0x79, 0xff);
    q.mask(0x70b2, 0x00, 0xff);
    q.mask(0x70b3, 0x02, 0xff);
    q.mask(0x70b4, 0x0b, 0x0f);
    q.mask(0x70b5, 0x00, 0xff);
    q.mask(0x70b6, 0x00, 0xff);
    q.write_reg(0x10f6, 0xff);
    q.write_reg(0x7011, 0xa2);
    q.wait_set(0x10f6, 0xa2);
    q.mask(0x7267, 0x00, 0xff);
    q.write_reg(0x7204, 0x10);
    q.wait_clear(0x7204, 0x10);
    q.write_reg(0x10f6, 0xff);
    q.mask(0x7203, 0x10, 0x10);
    q.write_reg(0x70a8, 0xc0);
}

#[cfg(test)]
mod tests {
    use super::*;
    use icc_cmdqueue::Opcode;

    #[test]
    fn test_pre_enable_batch() {
        let mut q = CommandQueue::default();
        pre_enable(&mut q);

        let groups = q.groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].opcode, Opcode::Write);
        assert_eq!(groups[0].count, 4);
        assert_eq!(groups[1].opcode, Opcode::WaitClear);
        assert_eq!(groups[1].operands, vec![0, 0x7a, 0x84, AKESTA_BUSY]);
    }

    #[test]
    fn test_mn864729_board_tweak() {
        let find = |cuh12xx| {
            let mut q = CommandQueue::default();
            mn864729_mode(&mut q, 16, cuh12xx);
            let bytes = q.to_bytes().unwrap();
            bytes
                .windows(4)
                .find(|w| w[..3] == [1, 0x10, 0xc5])
                .map(|w| w[3])
        };
        assert_eq!(find(true), Some(0x03));
        assert_eq!(find(false), Some(0x00));
    }

    #[test]
    fn test_sequences_fit_one_request() {
        let mut q = CommandQueue::default();
        mn86471a_mode(&mut q, [0; 3], 16);
        assert!(q.to_bytes().is_ok());

        q.clear();
        mn864729_mode(&mut q, 16, false);
        assert!(q.to_bytes().is_ok());
    }

    #[test]
    fn test_vic_lands_in_mode_registers() {
        let mut q = CommandQueue::default();
        mn86471a_mode(&mut q, [0; 3], 4);
        let bytes = q.to_bytes().unwrap();
        assert!(bytes.windows(4).any(|w| w == [1, 0x70, 0x62, 4]));
        assert!(bytes.windows(4).any(|w| w == [1, 0x70, 0x62, 0x84]));
    }
}
