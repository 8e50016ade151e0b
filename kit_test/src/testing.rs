//! In-memory stand-ins for hardware used by the unit tests.

use std::{
	collections::{HashMap, VecDeque},
	io,
	sync::{Arc, Mutex},
};

#[derive(Debug, Clone)]
enum Reply {
	Line(String),
	Disconnect,
}

#[derive(Debug, Default)]
struct State {
	replies: HashMap<String, VecDeque<Reply>>,
	partial: Vec<u8>,
	rx: VecDeque<u8>,
	eof: bool,
	chatter: Option<String>,
	sent: Vec<String>,
}

/// A serial port that answers lines from a script.
///
/// Each request pops its next scripted reply; the last reply for a request
/// repeats. Unscripted commands are acknowledged and unscripted queries are
/// rejected with a NACK.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPort {
	state: Arc<Mutex<State>>,
}

impl ScriptedPort {
	pub fn new() -> Self {
		Self::default()
	}

	fn push(self, request: &str, reply: Reply) -> Self {
		self.state
			.lock()
			.unwrap()
			.replies
			.entry(request.to_string())
			.or_default()
			.push_back(reply);
		self
	}

	pub fn answer(self, request: &str, response: &str) -> Self {
		self.push(request, Reply::Line(response.to_string()))
	}

	/// The port goes away when `request` is sent.
	pub fn disconnect_on(self, request: &str) -> Self {
		self.push(request, Reply::Disconnect)
	}

	/// Queue raw bytes for the next reads.
	pub fn emit(self, raw: &str) -> Self {
		self.state.lock().unwrap().rx.extend(raw.bytes());
		self
	}

	/// Keep printing `line` whenever nothing else is waiting to be read.
	pub fn chatter(self, line: &str) -> Self {
		self.state.lock().unwrap().chatter = Some(format!("{}\n", line));
		self
	}

	pub fn sent(&self) -> Vec<String> {
		self.state.lock().unwrap().sent.clone()
	}
}

impl State {
	fn reply_to(&mut self, request: String) {
		let reply = match self.replies.get_mut(&request) {
			Some(queue) if queue.len() > 1 => queue.pop_front(),
			Some(queue) => queue.front().cloned(),
			None => None,
		};

		let reply = reply.unwrap_or_else(|| {
			if request.ends_with('?') {
				Reply::Line("NACK:unknown query".to_string())
			} else {
				Reply::Line("ACK".to_string())
			}
		});

		match reply {
			Reply::Line(line) => {
				self.rx.extend(line.bytes());
				self.rx.push_back(b'\n');
			}
			Reply::Disconnect => self.eof = true,
		}

		self.sent.push(request);
	}
}

impl io::Write for ScriptedPort {
	fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
		let mut state = self.state.lock().unwrap();

		for b in buf {
			if *b == b'\n' {
				let line: Vec<u8> = state.partial.drain(..).collect();
				state.reply_to(String::from_utf8_lossy(&line).to_string());
			} else {
				state.partial.push(*b);
			}
		}

		Ok(buf.len())
	}

	fn flush(&mut self) -> io::Result<()> {
		Ok(())
	}
}

impl io::Read for ScriptedPort {
	fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
		let mut state = self.state.lock().unwrap();

		if state.rx.is_empty() {
			if let Some(line) = state.chatter.clone() {
				state.rx.extend(line.bytes());
			}
		}

		if state.rx.is_empty() {
			if state.eof {
				state.eof = false;
				return Ok(0);
			}

			return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
		}

		let n = buf.len().min(state.rx.len());
		for (slot, b) in buf.iter_mut().zip(state.rx.drain(..n)) {
			*slot = b;
		}

		Ok(n)
	}
}
