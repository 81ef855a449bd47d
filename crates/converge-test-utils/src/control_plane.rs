//! Scripted in-memory control plane
//!
//! Stores objects in memory and lets tests script what reads return and
//! which calls fail. Every call is recorded so tests can assert on how many
//! remote calls an operation issued.

use async_trait::async_trait;
use converge_common::{
    ControlPlane, Fields, RemoteError, RemoteSnapshot, ResourceHandle, ResourceKind,
    ResourceStatus,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};

/// Kind of a recorded call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    Create,
    Read,
    Update,
    Delete,
}

/// A recorded control plane call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Create { kind: ResourceKind, fields: Fields },
    Read(ResourceHandle),
    Update { handle: ResourceHandle, changed: Fields },
    Delete(ResourceHandle),
}

impl Call {
    pub fn kind(&self) -> CallKind {
        match self {
            Call::Create { .. } => CallKind::Create,
            Call::Read(_) => CallKind::Read,
            Call::Update { .. } => CallKind::Update,
            Call::Delete(_) => CallKind::Delete,
        }
    }
}

#[derive(Debug, Clone)]
struct StoredObject {
    fields: Fields,
    status: ResourceStatus,
}

#[derive(Default)]
struct State {
    next_id: u64,
    objects: HashMap<ResourceHandle, StoredObject>,
    /// Whole read results, consumed before falling back to stored objects
    read_script: VecDeque<Result<RemoteSnapshot, RemoteError>>,
    /// Status assigned to the stored object on each read
    status_script: VecDeque<ResourceStatus>,
    create_failures: VecDeque<RemoteError>,
    update_failures: VecDeque<RemoteError>,
    delete_failures: VecDeque<RemoteError>,
    calls: Vec<Call>,
}

/// In-memory control plane with scriptable reads and failures
pub struct ScriptedControlPlane {
    state: Mutex<State>,
    /// Status newly created objects start in
    initial_status: ResourceStatus,
    /// Status objects are left in right after an update
    status_after_update: ResourceStatus,
    /// Keep a `Deleting` tombstone instead of removing objects on delete
    soft_delete: bool,
}

impl Default for ScriptedControlPlane {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedControlPlane {
    /// A control plane where everything settles immediately
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            initial_status: ResourceStatus::Available,
            status_after_update: ResourceStatus::Available,
            soft_delete: false,
        }
    }

    pub fn with_initial_status(mut self, status: ResourceStatus) -> Self {
        self.initial_status = status;
        self
    }

    pub fn with_status_after_update(mut self, status: ResourceStatus) -> Self {
        self.status_after_update = status;
        self
    }

    /// Deleted objects linger in `Deleting` until a scripted status moves them on
    pub fn with_soft_delete(mut self) -> Self {
        self.soft_delete = true;
        self
    }

    /// Statuses the next reads will report, in order
    pub fn with_statuses(self, statuses: impl IntoIterator<Item = ResourceStatus>) -> Self {
        self.lock().status_script.extend(statuses);
        self
    }

    /// Queue a whole read result
    pub fn push_read(&self, result: Result<RemoteSnapshot, RemoteError>) {
        self.lock().read_script.push_back(result);
    }

    pub fn push_status(&self, status: ResourceStatus) {
        self.lock().status_script.push_back(status);
    }

    pub fn fail_next_create(&self, error: RemoteError) {
        self.lock().create_failures.push_back(error);
    }

    pub fn fail_next_update(&self, error: RemoteError) {
        self.lock().update_failures.push_back(error);
    }

    pub fn fail_next_delete(&self, error: RemoteError) {
        self.lock().delete_failures.push_back(error);
    }

    /// Seed an object as if it had been created out of band
    pub fn insert(&self, handle: ResourceHandle, fields: Fields, status: ResourceStatus) {
        self.lock()
            .objects
            .insert(handle, StoredObject { fields, status });
    }

    /// Remove an object behind the engine's back
    pub fn remove(&self, handle: &ResourceHandle) {
        self.lock().objects.remove(handle);
    }

    pub fn fields_of(&self, handle: &ResourceHandle) -> Option<Fields> {
        self.lock().objects.get(handle).map(|o| o.fields.clone())
    }

    pub fn contains(&self, handle: &ResourceHandle) -> bool {
        self.lock().objects.contains_key(handle)
    }

    pub fn calls(&self) -> Vec<Call> {
        self.lock().calls.clone()
    }

    pub fn count(&self, kind: CallKind) -> usize {
        self.lock().calls.iter().filter(|c| c.kind() == kind).count()
    }

    /// Calls other than reads
    pub fn mutating_calls(&self) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.kind() != CallKind::Read)
            .count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("control plane state poisoned")
    }
}

#[async_trait]
impl ControlPlane for ScriptedControlPlane {
    async fn create(
        &self,
        kind: ResourceKind,
        fields: &Fields,
    ) -> Result<ResourceHandle, RemoteError> {
        let mut state = self.lock();
        state.calls.push(Call::Create {
            kind,
            fields: fields.clone(),
        });
        if let Some(err) = state.create_failures.pop_front() {
            return Err(err);
        }

        state.next_id += 1;
        let handle = ResourceHandle::new(kind, format!("{}-{}", kind, state.next_id));
        state.objects.insert(
            handle.clone(),
            StoredObject {
                fields: fields.clone(),
                status: self.initial_status,
            },
        );
        Ok(handle)
    }

    async fn read(&self, handle: &ResourceHandle) -> Result<RemoteSnapshot, RemoteError> {
        let mut state = self.lock();
        state.calls.push(Call::Read(handle.clone()));
        if let Some(result) = state.read_script.pop_front() {
            return result;
        }

        let next_status = state.status_script.pop_front();
        let Some(object) = state.objects.get_mut(handle) else {
            return Err(RemoteError::not_found(format!("{handle} does not exist")));
        };
        if let Some(status) = next_status {
            object.status = status;
        }
        let snapshot = RemoteSnapshot::new(object.fields.clone(), object.status);
        if object.status == ResourceStatus::Deleted {
            state.objects.remove(handle);
        }
        Ok(snapshot)
    }

    async fn update(&self, handle: &ResourceHandle, changed: &Fields) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(Call::Update {
            handle: handle.clone(),
            changed: changed.clone(),
        });
        if let Some(err) = state.update_failures.pop_front() {
            return Err(err);
        }

        let Some(object) = state.objects.get_mut(handle) else {
            return Err(RemoteError::not_found(format!("{handle} does not exist")));
        };
        for (name, value) in changed {
            object.fields.insert(name.clone(), value.clone());
        }
        object.status = self.status_after_update;
        Ok(())
    }

    async fn delete(&self, handle: &ResourceHandle) -> Result<(), RemoteError> {
        let mut state = self.lock();
        state.calls.push(Call::Delete(handle.clone()));
        if let Some(err) = state.delete_failures.pop_front() {
            return Err(err);
        }

        if self.soft_delete {
            return match state.objects.get_mut(handle) {
                Some(object) => {
                    object.status = ResourceStatus::Deleting;
                    Ok(())
                }
                None => Err(RemoteError::not_found(format!("{handle} does not exist"))),
            };
        }

        match state.objects.remove(handle) {
            Some(_) => Ok(()),
            None => Err(RemoteError::not_found(format!("{handle} does not exist"))),
        }
    }
}
