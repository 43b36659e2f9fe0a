//! Simulated u-blox receiver behind the transport traits

#![allow(dead_code)]

use gnsslink_core::core::protocol::ubx;
use gnsslink_core::{
    AtChannel, DeviceSettings, GnssDevice, ManualClock, ModuleType, SpiBus, Transport,
    TransportError, UartPort,
};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::Arc;

pub const CLASS_ACK: u8 = 0x05;
pub const CLASS_CFG: u8 = 0x06;
pub const CLASS_MON: u8 = 0x0A;
pub const CFG_PRT: u8 = 0x00;
pub const CFG_VALSET: u8 = 0x8A;
pub const CFG_VALGET: u8 = 0x8B;
pub const MON_MSGPP: u8 = 0x06;
pub const MON_VER: u8 = 0x04;

/// Receiver state shared between the test and the transport double
#[derive(Debug)]
pub struct SimState {
    /// Bytes waiting to be read by the host
    pub rx: VecDeque<u8>,
    /// UBX messages parsed on the host port
    pub msgpp: u64,
    /// Messages the port loses before they are counted
    pub uncounted: HashSet<(u8, u8)>,
    pub port_number: u8,
    pub cfg_prt: [u8; 20],
    pub config: BTreeMap<u32, u8>,
    /// Bodies returned for polls of these messages
    pub replies: HashMap<(u8, u8), Vec<u8>>,
    /// Messages rejected with ACK-NAK
    pub nak: HashSet<(u8, u8)>,
    /// Messages taken without any reply
    pub silent: HashSet<(u8, u8)>,
    /// Bytes put on the wire ahead of every reply
    pub noise: Vec<u8>,
    /// Every frame the host sent
    pub received: Vec<Vec<u8>>,
}

impl Default for SimState {
    fn default() -> Self {
        let mut cfg_prt = [0u8; 20];
        cfg_prt[0] = 1;
        // UBX + NMEA in and out
        cfg_prt[12] = 0x03;
        cfg_prt[14] = 0x03;
        Self {
            rx: VecDeque::new(),
            msgpp: 0,
            uncounted: HashSet::new(),
            port_number: 1,
            cfg_prt,
            config: BTreeMap::new(),
            replies: HashMap::new(),
            nak: HashSet::new(),
            silent: HashSet::new(),
            noise: Vec::new(),
            received: Vec::new(),
        }
    }
}

impl SimState {
    pub fn queue(&mut self, bytes: &[u8]) {
        self.rx.extend(bytes.iter().copied());
    }

    fn reply(&mut self, class: u8, id: u8, body: &[u8]) {
        let noise = self.noise.clone();
        self.queue(&noise);
        let frame = ubx::encode(class, id, body).expect("reply encodes");
        self.queue(&frame);
    }

    fn ack(&mut self, class: u8, id: u8, ok: bool) {
        self.reply(CLASS_ACK, u8::from(ok), &[class, id]);
    }

    pub fn out_mask(&self) -> u16 {
        u16::from_le_bytes([self.cfg_prt[14], self.cfg_prt[15]])
    }

    /// React to one complete frame from the host.
    pub fn handle(&mut self, frame: &[u8]) {
        let Ok(msg) = ubx::decode(frame) else {
            return;
        };
        let (class, id, body) = (msg.class, msg.id, msg.body.to_vec());
        self.received.push(frame.to_vec());
        if !self.uncounted.contains(&(class, id)) {
            self.msgpp += 1;
        }

        if self.silent.contains(&(class, id)) {
            return;
        }
        if self.nak.contains(&(class, id)) {
            self.ack(class, id, false);
            return;
        }
        match (class, id, body.len()) {
            (CLASS_MON, MON_MSGPP, 0) => {
                let mut report = vec![0u8; 120];
                let offset = usize::from(self.port_number) * 16;
                report[offset..offset + 8]
                    .copy_from_slice(&self.msgpp.to_le_bytes());
                self.reply(CLASS_MON, MON_MSGPP, &report);
            }
            (CLASS_CFG, CFG_PRT, 1) => {
                let prt = self.cfg_prt;
                self.reply(CLASS_CFG, CFG_PRT, &prt);
            }
            (CLASS_CFG, CFG_PRT, 20) => {
                self.cfg_prt.copy_from_slice(&body);
                self.ack(class, id, true);
            }
            (CLASS_CFG, CFG_VALSET, _) => {
                for entry in body[4..].chunks_exact(5) {
                    let key = u32::from_le_bytes([entry[0], entry[1], entry[2], entry[3]]);
                    self.config.insert(key, entry[4]);
                }
                self.ack(class, id, true);
            }
            (CLASS_CFG, CFG_VALGET, 8) => {
                let group = u32::from_le_bytes([body[4], body[5], body[6], body[7]]) >> 16;
                let mut out = vec![0x01, body[1], 0x00, 0x00];
                for (key, value) in &self.config {
                    if key >> 16 == group {
                        out.extend_from_slice(&key.to_le_bytes());
                        out.push(*value);
                    }
                }
                self.reply(CLASS_CFG, CFG_VALGET, &out);
            }
            _ => {
                if let Some(reply) = self.replies.get(&(class, id)).cloned() {
                    self.reply(class, id, &reply);
                } else if !body.is_empty() {
                    self.ack(class, id, true);
                }
            }
        }
    }
}

pub type Shared = Arc<Mutex<SimState>>;

/// UART end of the simulated receiver
pub struct SimUart(pub Shared);

impl UartPort for SimUart {
    fn write(&mut self, data: &[u8]) -> Result<usize, TransportError> {
        self.0.lock().handle(data);
        Ok(data.len())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.0.lock();
        let n = buf.len().min(state.rx.len());
        for (slot, byte) in buf.iter_mut().zip(state.rx.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn pending_bytes(&mut self) -> Result<usize, TransportError> {
        Ok(self.0.lock().rx.len())
    }
}

/// SPI end of the simulated receiver; idle output is 0xFF
pub struct SimSpi {
    pub state: Shared,
    inbound: Vec<u8>,
}

impl SimSpi {
    pub fn new(state: Shared) -> Self {
        Self {
            state,
            inbound: Vec::new(),
        }
    }
}

impl SpiBus for SimSpi {
    fn send_receive_block(&mut self, out: &[u8], input: &mut [u8]) -> Result<usize, TransportError> {
        let mut state = self.state.lock();
        for slot in input.iter_mut() {
            *slot = state.rx.pop_front().unwrap_or(0xFF);
        }
        self.inbound.extend_from_slice(out);
        if let Ok(frame) = ubx::decode(&self.inbound) {
            let len = frame.body.len() + ubx::OVERHEAD;
            let frame = self.inbound[..len].to_vec();
            self.inbound.drain(..len);
            state.handle(&frame);
        }
        Ok(input.len().max(out.len()))
    }
}

/// AT tunnel that answers every command with a fixed hex string
pub struct StubAt {
    pub response: String,
    pub commands: Arc<Mutex<Vec<String>>>,
    locked: bool,
}

impl StubAt {
    pub fn new(response: &str) -> (Self, Arc<Mutex<Vec<String>>>) {
        let commands = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                response: response.to_string(),
                commands: Arc::clone(&commands),
                locked: false,
            },
            commands,
        )
    }
}

impl AtChannel for StubAt {
    fn lock(&mut self) {
        self.locked = true;
    }

    fn set_timeout(&mut self, _timeout_ms: u64) {}

    fn command_start(&mut self, command: &str) {
        self.commands.lock().push(command.to_string());
    }

    fn write_string(&mut self, value: &str, quoted: bool) {
        let mut commands = self.commands.lock();
        if let Some(last) = commands.last_mut() {
            if quoted {
                last.push_str(&format!("\"{value}\""));
            } else {
                last.push_str(value);
            }
        }
    }

    fn command_stop(&mut self) {}

    fn response_start(&mut self, _prefix: &str) {}

    fn read_string(&mut self, max_len: usize) -> Result<String, TransportError> {
        Ok(self.response.chars().take(max_len).collect())
    }

    fn response_stop(&mut self) {}

    fn unlock(&mut self) -> Result<(), TransportError> {
        if !self.locked {
            return Err(TransportError::NotConnected);
        }
        self.locked = false;
        Ok(())
    }
}

pub fn test_settings() -> DeviceSettings {
    DeviceSettings {
        timeout_ms: 1000,
        ..DeviceSettings::default()
    }
}

/// UART-attached simulated receiver on virtual time
pub fn uart_device(module: ModuleType) -> (GnssDevice, Shared) {
    let state: Shared = Arc::new(Mutex::new(SimState::default()));
    let device = GnssDevice::with_clock(
        module,
        Transport::Uart(Box::new(SimUart(Arc::clone(&state)))),
        test_settings(),
        Arc::new(ManualClock::new()),
    )
    .expect("device");
    (device, state)
}

/// SPI-attached simulated receiver on virtual time
pub fn spi_device() -> (GnssDevice, Shared) {
    let state: Shared = Arc::new(Mutex::new(SimState::default()));
    let device = GnssDevice::with_clock(
        ModuleType::M9,
        Transport::Spi(Box::new(SimSpi::new(Arc::clone(&state)))),
        test_settings(),
        Arc::new(ManualClock::new()),
    )
    .expect("device");
    (device, state)
}
