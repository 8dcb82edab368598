use crate::ghosts::object_registry::{ObjectFlags, ObjectId, ObjectRegistry};

/// Collects the objects a connection should currently see
#[derive(Default)]
pub struct GhostScope {
    objects: Vec<ObjectId>,
}

impl GhostScope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, id: ObjectId) {
        self.objects.push(id);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub(crate) fn into_objects(self) -> Vec<ObjectId> {
        self.objects
    }
}

/// Decides, once per send pass, which objects are in scope for a connection.
/// Scope-always objects need not be added; they stay in scope regardless.
pub trait ScopeQuery {
    fn scope(&mut self, objects: &ObjectRegistry, scope: &mut GhostScope);
}

/// Scopes every ghostable object
pub struct ScopeEverything;

impl ScopeQuery for ScopeEverything {
    fn scope(&mut self, objects: &ObjectRegistry, scope: &mut GhostScope) {
        for (id, _, flags) in objects.iter() {
            if flags.contains(ObjectFlags::GHOSTABLE) && !flags.contains(ObjectFlags::SCOPE_ALWAYS) {
                scope.add(id);
            }
        }
    }
}

impl<F> ScopeQuery for F
where
    F: FnMut(&ObjectRegistry, &mut GhostScope),
{
    fn scope(&mut self, objects: &ObjectRegistry, scope: &mut GhostScope) {
        self(objects, scope)
    }
}
