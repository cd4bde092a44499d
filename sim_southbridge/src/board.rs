//! Register-level model of the devices behind the southbridge
//!
//! Command queues run against one flat register file; I2C slaves live in
//! the same space under their shifted addresses. Waits are satisfied
//! immediately and delays are ignored.

use crate::firmware::{Responder, SimRequest};
use icc_cmdqueue::queue::{CMDQUEUE_MAJOR, CMDQUEUE_MINOR, GROUP_HEADER_SIZE, REQUEST_HEADER_SIZE};
use icc_cmdqueue::Opcode;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

/// Firmware version reported by default
pub const DEFAULT_FIRMWARE_VERSION: [u8; 8] = [0x00, 0x02, 0x1b, 0x00, 0x01, 0x00, 0x00, 0x00];

/// Status byte of a queue the model could not parse
pub const MALFORMED_QUEUE: u8 = 0xff;

struct BoardState {
    registers: HashMap<u16, u8>,
    queue_status: (u8, u8),
    silent: Vec<(u8, u16)>,
}

/// Default responder: answers every command, runs command queues
pub struct BoardModel {
    firmware_version: Vec<u8>,
    state: Mutex<BoardState>,
}

impl Default for BoardModel {
    fn default() -> Self {
        Self::new()
    }
}

impl BoardModel {
    pub fn new() -> Self {
        Self {
            firmware_version: DEFAULT_FIRMWARE_VERSION.to_vec(),
            state: Mutex::new(BoardState {
                registers: HashMap::new(),
                queue_status: (0, 0),
                silent: Vec::new(),
            }),
        }
    }

    pub fn register(&self, addr: u16) -> u8 {
        self.lock().registers.get(&addr).copied().unwrap_or(0)
    }

    pub fn set_register(&self, addr: u16, value: u8) {
        self.lock().registers.insert(addr, value);
    }

    /// Status bytes returned for every following command queue
    pub fn set_queue_status(&self, res1: u8, res2: u8) {
        self.lock().queue_status = (res1, res2);
    }

    /// Stops answering one command
    pub fn silence(&self, major: u8, minor: u16) {
        self.lock().silent.push((major, minor));
    }

    fn lock(&self) -> MutexGuard<'_, BoardState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs a command queue; reply is `res1 res2 0 0 count data..`
    ///
    /// Each read result in `data` is its address (big-endian) and length
    /// followed by the bytes read.
    fn run_queue(&self, request: &[u8]) -> Vec<u8> {
        let mut state = self.lock();
        match execute(&mut state.registers, request) {
            Some((count, data)) => {
                let (res1, res2) = state.queue_status;
                let mut reply = vec![res1, res2, 0, 0, count];
                reply.extend_from_slice(&data);
                reply
            }
            None => {
                log::warn!("sim: malformed command queue");
                vec![MALFORMED_QUEUE, 0, 0, 0, 0]
            }
        }
    }
}

fn be(hi: u8, lo: u8) -> u16 {
    u16::from_be_bytes([hi, lo])
}

fn execute(registers: &mut HashMap<u16, u8>, request: &[u8]) -> Option<(u8, Vec<u8>)> {
    let len = usize::from(u16::from_le_bytes([*request.get(1)?, *request.get(2)?]));
    let request = request.get(..len)?;
    let groups = *request.get(3)?;

    let mut at = REQUEST_HEADER_SIZE;
    let mut results = 0u8;
    let mut data = Vec::new();
    for _ in 0..groups {
        let header = request.get(at..at + GROUP_HEADER_SIZE)?;
        let group_len = usize::from(header[1]);
        let opcode = Opcode::from_wire(header[0], header[2])?;
        let operands = request.get(at + GROUP_HEADER_SIZE..at + group_len)?;
        at += group_len;

        let mut cursor = 0;
        for _ in 0..header[3] {
            let op = operands.get(cursor..)?;
            match opcode {
                Opcode::Read => {
                    let (count, addr) = (op.get(0)?, be(*op.get(1)?, *op.get(2)?));
                    data.extend_from_slice(&[op[1], op[2], *count]);
                    for i in 0..u16::from(*count) {
                        let value = registers.get(&addr.wrapping_add(i)).copied().unwrap_or(0);
                        data.push(value);
                    }
                    results = results.wrapping_add(1);
                    cursor += 4;
                }
                Opcode::Write => {
                    let count = usize::from(*op.first()?);
                    let addr = be(*op.get(1)?, *op.get(2)?);
                    for (i, value) in op.get(3..3 + count)?.iter().enumerate() {
                        registers.insert(addr.wrapping_add(i as u16), *value);
                    }
                    cursor += 3 + count;
                }
                Opcode::Mask => {
                    let addr = be(*op.get(1)?, *op.get(2)?);
                    let (value, mask) = (*op.get(3)?, *op.get(4)?);
                    let reg = registers.entry(addr).or_insert(0);
                    *reg = (*reg & !mask) | (value & mask);
                    cursor += 5;
                }
                Opcode::Delay | Opcode::WaitSet | Opcode::WaitClear => {
                    op.get(..4)?;
                    cursor += 4;
                }
            }
        }
    }
    Some((results, data))
}

impl Responder for BoardModel {
    fn respond(&self, request: &SimRequest) -> Option<Vec<u8>> {
        let key = (request.major, request.minor);
        if self.lock().silent.contains(&key) {
            return None;
        }
        match key {
            (CMDQUEUE_MAJOR, CMDQUEUE_MINOR) => Some(self.run_queue(&request.payload)),
            (0x02, 0x06) => Some(self.firmware_version.clone()),
            _ => Some(vec![0]),
        }
    }
}
