//! Simulated sensor behind a `MemoryTransport`

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use fpsense::config::RetryConfig;
use fpsense::{DriverConfig, Instruction, MemoryTransport, Packet};
use fpsense_core::constants::notepad;
use fpsense_core::{Decoded, Framer, PacketType, DEFAULT_ADDRESS};

pub struct SimState {
    pub password: u32,
    pub finger: bool,
    pub search_hit: Option<(u16, u16)>,
    pub templates: BTreeSet<u16>,
    pub capacity: u16,
    pub notepad: Vec<u8>,
    pub reg_model_outcome: u8,
    pub online: bool,
    pub log: Vec<(Instruction, Vec<u8>)>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            password: 0,
            finger: false,
            search_hit: None,
            templates: BTreeSet::new(),
            capacity: 200,
            notepad: vec![0; notepad::PAGE_SIZE],
            reg_model_outcome: 0x00,
            online: true,
            log: Vec::new(),
        }
    }
}

/// Shared handle on the simulated module
#[derive(Clone, Default)]
pub struct Sensor {
    state: Arc<Mutex<SimState>>,
}

impl Sensor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn set_finger(&self, present: bool) {
        self.with(|s| s.finger = present);
    }

    pub fn set_online(&self, online: bool) {
        self.with(|s| s.online = online);
    }

    /// Instructions received so far, oldest first
    pub fn instructions(&self) -> Vec<Instruction> {
        self.with(|s| s.log.iter().map(|(instruction, _)| *instruction).collect())
    }

    pub fn count(&self, instruction: Instruction) -> usize {
        self.instructions().iter().filter(|i| **i == instruction).count()
    }

    /// Parameter bytes of every `instruction` received
    pub fn params(&self, instruction: Instruction) -> Vec<Vec<u8>> {
        self.with(|s| {
            s.log
                .iter()
                .filter(|(i, _)| *i == instruction)
                .map(|(_, params)| params.clone())
                .collect()
        })
    }

    pub fn clear_log(&self) {
        self.with(|s| s.log.clear());
    }

    pub fn transport(&self) -> MemoryTransport {
        let state = self.state.clone();
        MemoryTransport::new(move |frame| {
            let mut state = state.lock().unwrap();
            respond(&mut state, frame)
        })
        .with_name("sim")
    }
}

fn respond(state: &mut SimState, frame: &[u8]) -> Vec<u8> {
    let mut framer = Framer::new();
    framer.push(frame);
    let Decoded::Packet(packet) = framer.decode() else {
        return Vec::new();
    };
    let Ok(instruction) = Instruction::try_from(packet.payload[0]) else {
        return ack(&[0x01]);
    };
    let params = packet.payload[1..].to_vec();
    state.log.push((instruction, params.clone()));

    if !state.online {
        return Vec::new();
    }

    let u16_at = |at: usize| u16::from_be_bytes([params[at], params[at + 1]]);

    match instruction {
        Instruction::VfyPwd => {
            let password = u32::from_be_bytes([params[0], params[1], params[2], params[3]]);
            ack(&[if password == state.password { 0x00 } else { 0x13 }])
        }
        Instruction::ReadSysPara => {
            let mut reply = vec![0x00];
            reply.extend_from_slice(&0u16.to_be_bytes());
            reply.extend_from_slice(&0u16.to_be_bytes());
            reply.extend_from_slice(&state.capacity.to_be_bytes());
            reply.extend_from_slice(&3u16.to_be_bytes());
            reply.extend_from_slice(&DEFAULT_ADDRESS.to_be_bytes());
            reply.extend_from_slice(&2u16.to_be_bytes());
            reply.extend_from_slice(&6u16.to_be_bytes());
            ack(&reply)
        }
        Instruction::TemplateNum => {
            let count = state.templates.len() as u16;
            let mut reply = vec![0x00];
            reply.extend_from_slice(&count.to_be_bytes());
            ack(&reply)
        }
        Instruction::GenImg => ack(&[if state.finger { 0x00 } else { 0x02 }]),
        Instruction::Img2Tz => ack(&[if state.finger { 0x00 } else { 0x15 }]),
        Instruction::Search => match state.search_hit {
            Some((id, score)) => {
                let mut reply = vec![0x00];
                reply.extend_from_slice(&id.to_be_bytes());
                reply.extend_from_slice(&score.to_be_bytes());
                ack(&reply)
            }
            None => ack(&[0x09]),
        },
        Instruction::RegModel => ack(&[state.reg_model_outcome]),
        Instruction::Store => {
            let id = u16_at(1);
            if id >= state.capacity {
                return ack(&[0x0B]);
            }
            state.templates.insert(id);
            ack(&[0x00])
        }
        Instruction::DeletChar => {
            let id = u16_at(0);
            if id >= state.capacity {
                return ack(&[0x10]);
            }
            state.templates.remove(&id);
            ack(&[0x00])
        }
        Instruction::Empty => {
            state.templates.clear();
            ack(&[0x00])
        }
        Instruction::ReadIndexTable => {
            let base = u16::from(params[0]) * 256;
            let mut table = [0u8; 32];
            for id in state.templates.iter().filter(|id| (base..base + 256).contains(*id)) {
                let offset = id - base;
                table[usize::from(offset / 8)] |= 1 << (offset % 8);
            }
            let mut reply = vec![0x00];
            reply.extend_from_slice(&table);
            ack(&reply)
        }
        Instruction::WriteNotepad => {
            state.notepad = params[1..].to_vec();
            ack(&[0x00])
        }
        Instruction::ReadNotepad => {
            let mut reply = vec![0x00];
            reply.extend_from_slice(&state.notepad);
            ack(&reply)
        }
        Instruction::AuraLedConfig => ack(&[0x00]),
        _ => ack(&[0x01]),
    }
}

fn ack(payload: &[u8]) -> Vec<u8> {
    Packet::with_payload(PacketType::Ack, DEFAULT_ADDRESS, payload.to_vec())
        .encode()
        .to_vec()
}

/// Fast, LED-less settings for simulated runs
pub fn config() -> DriverConfig {
    let mut config = DriverConfig::default()
        .with_led_feedback(false)
        .with_command_timeout(Duration::from_millis(50))
        .with_enroll_samples(3)
        .with_retry(RetryConfig {
            max_attempts: 1,
            base_delay_ms: 10,
            exponential: false,
        });
    config.setup_retry_delay_ms = 100;
    config
}

/// Observed values, recorded in arrival order
#[derive(Clone)]
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Observer closure feeding this recorder
    pub fn observer(&self) -> impl FnMut(T) + Send + 'static {
        let values = self.values.clone();
        move |value| values.lock().unwrap().push(value)
    }

    pub fn values(&self) -> Vec<T> {
        self.values.lock().unwrap().clone()
    }

    pub fn last(&self) -> Option<T> {
        self.values.lock().unwrap().last().cloned()
    }

    pub fn clear(&self) {
        self.values.lock().unwrap().clear();
    }
}
