
//! Satellite-to-channel assignment table.
//!
//! The one piece of state shared across channel tasks.  Guarded by a mutex;
//! every operation is a short critical section and the table is never held
//! across an await point.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::Error;

pub struct AssignmentTable {
	inner: Mutex<HashMap<usize, usize>>,
}

impl AssignmentTable {

	pub fn new() -> Self {
		Self{ inner: Mutex::new(HashMap::new()) }
	}

	fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<usize, usize>> {
		self.inner.lock().unwrap_or_else(|e| e.into_inner())
	}

	/// Claims a PRN for a channel.  Fails if another channel already has it;
	/// reclaiming one's own assignment is a no-op.
	pub fn try_assign(&self, prn: usize, channel_id: usize) -> Result<(), Error> {
		let mut table = self.lock();
		match table.get(&prn) {
			Some(owner) if *owner != channel_id => Err(Error::InvalidInput("PRN already assigned to another channel")),
			_ => {
				table.insert(prn, channel_id);
				Ok(())
			},
		}
	}

	/// Releases a PRN, but only if the caller actually owns it
	pub fn release(&self, prn: usize, channel_id: usize) {
		let mut table = self.lock();
		if table.get(&prn) == Some(&channel_id) {
			table.remove(&prn);
		}
	}

	pub fn assignment(&self, prn: usize) -> Option<usize> {
		self.lock().get(&prn).copied()
	}

	pub fn assigned_prns(&self) -> Vec<usize> {
		let mut prns:Vec<usize> = self.lock().keys().copied().collect();
		prns.sort_unstable();
		prns
	}

}

impl Default for AssignmentTable {
	fn default() -> Self { Self::new() }
}
