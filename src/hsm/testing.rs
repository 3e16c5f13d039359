//! Process-runner fakes for exercising the token adapter without hardware.

use std::collections::VecDeque;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::runner::{ProcessCommand, ProcessOutput, ProcessRunner};
use crate::error::Result;

/// Records every command and replays canned outputs in order
///
/// Once the script runs out every call gets a failing output.
pub struct SpyRunner {
    outputs: Mutex<VecDeque<ProcessOutput>>,
    calls: Mutex<Vec<ProcessCommand>>,
}

impl SpyRunner {
    pub fn new(outputs: Vec<ProcessOutput>) -> Self {
        Self {
            outputs: Mutex::new(outputs.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<ProcessCommand> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ProcessRunner for SpyRunner {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        self.calls.lock().push(command.clone());
        Ok(self
            .outputs
            .lock()
            .pop_front()
            .unwrap_or_else(|| ProcessOutput::failed(127, "spy: no scripted output")))
    }
}

struct SimObject {
    private: bool,
    key_type: &'static str,
    label: String,
}

struct SimSlot {
    id: &'static str,
    label: Option<String>,
    objects: Vec<SimObject>,
}

struct SimState {
    slots: Vec<SimSlot>,
    init_count: usize,
}

/// In-memory token answering `pkcs11-tool` the way SoftHSM does
pub struct SimulatedToken {
    state: Mutex<SimState>,
}

impl SimulatedToken {
    /// One empty, uninitialized slot
    pub fn new() -> Self {
        Self {
            state: Mutex::new(SimState {
                slots: vec![SimSlot {
                    id: "0x2d6b0b0a",
                    label: None,
                    objects: Vec::new(),
                }],
                init_count: 0,
            }),
        }
    }

    /// Number of `--init-token` invocations seen
    pub fn init_count(&self) -> usize {
        self.state.lock().init_count
    }

    fn list_slots(state: &SimState) -> ProcessOutput {
        let mut out = String::from("Available slots:\n");
        for (i, slot) in state.slots.iter().enumerate() {
            out.push_str(&format!("Slot {} ({}): SoftHSM slot ID {}\n", i, slot.id, slot.id));
            match &slot.label {
                Some(label) => {
                    out.push_str(&format!("  token label        : {}\n", label));
                    out.push_str("  token manufacturer : SoftHSM project\n");
                    out.push_str("  token model        : SoftHSM v2\n");
                    out.push_str(
                        "  token flags        : login required, rng, token initialized, PIN initialized\n",
                    );
                    out.push_str("  serial num         : 5c7e0fd22d6b0b0a\n");
                }
                None => out.push_str("  token state:   uninitialized\n"),
            }
        }
        ProcessOutput::ok(out)
    }

    fn slot_mut<'a>(state: &'a mut SimState, command: &ProcessCommand) -> Option<&'a mut SimSlot> {
        let label = command.flag_value("--token-label")?;
        state
            .slots
            .iter_mut()
            .find(|s| s.label.as_deref() == Some(label))
    }

    fn list_objects(slot: &SimSlot) -> ProcessOutput {
        let mut out = format!("Using slot 0 with a present token ({})\n", slot.id);
        for object in &slot.objects {
            if object.private {
                out.push_str(&format!("Private Key Object; {}\n", object.key_type));
                out.push_str(&format!("  label:      {}\n", object.label));
                out.push_str("  Usage:      decrypt, sign\n");
                out.push_str("  Access:     sensitive, always sensitive, never extractable, local\n");
            } else {
                out.push_str(&format!("Public Key Object; {}\n", object.key_type));
                out.push_str(&format!("  label:      {}\n", object.label));
                out.push_str("  Usage:      encrypt, verify\n");
                out.push_str("  Access:     local\n");
            }
        }
        ProcessOutput::ok(out)
    }
}

#[async_trait]
impl ProcessRunner for SimulatedToken {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        let mut state = self.state.lock();

        if command.has_flag("-L") {
            return Ok(Self::list_slots(&state));
        }

        if command.has_flag("--init-token") {
            state.init_count += 1;
            let label = command.flag_value("--label").unwrap_or_default().to_string();
            return Ok(match state.slots.first_mut() {
                Some(slot) => {
                    slot.label = Some(label);
                    slot.objects.clear();
                    ProcessOutput::ok("Token successfully initialized\n")
                }
                None => ProcessOutput::failed(1, "error: no slot"),
            });
        }

        let Some(slot) = Self::slot_mut(&mut state, command) else {
            return Ok(ProcessOutput::failed(1, "error: No slot with token label"));
        };

        if command.has_flag("-O") {
            return Ok(Self::list_objects(slot));
        }

        if command.has_flag("--keypairgen") {
            let label = command.flag_value("--label").unwrap_or_default().to_string();
            let key_type = match command.flag_value("--key-type") {
                Some(spec) if spec.starts_with("rsa:") => "RSA",
                _ => "EC",
            };
            for private in [false, true] {
                slot.objects.push(SimObject {
                    private,
                    key_type,
                    label: label.clone(),
                });
            }
            return Ok(ProcessOutput::ok("Key pair generated:\n"));
        }

        if command.has_flag("--delete-object") {
            let label = command.flag_value("--label").unwrap_or_default();
            let private = command.flag_value("--type") == Some("privkey");
            let before = slot.objects.len();
            slot.objects
                .retain(|o| !(o.label == label && o.private == private));
            return Ok(if slot.objects.len() < before {
                ProcessOutput::ok("")
            } else {
                ProcessOutput::failed(1, "error: object not found")
            });
        }

        Ok(ProcessOutput::failed(1, "error: unsupported operation"))
    }
}
