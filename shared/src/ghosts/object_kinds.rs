use std::{
    any::{type_name, TypeId},
    collections::HashMap,
};

use ghostnet_serde::{bits_required, read_bits, write_bits, BitReader, BitWrite, SerdeErr};

use crate::{ghosts::replicable::Replicable, types::ClassId};

type CreateFn = fn() -> Box<dyn Replicable>;

fn create_boxed<R: Replicable + Default>() -> Box<dyn Replicable> {
    Box::new(R::default())
}

struct ObjectEntry {
    name: &'static str,
    create: CreateFn,
}

/// Registry of replicable object types; a ghost's class id tells the
/// receiver which type to construct
pub struct ObjectKinds {
    class_ids: HashMap<TypeId, ClassId>,
    entries: Vec<ObjectEntry>,
}

impl ObjectKinds {
    pub fn new() -> Self {
        Self {
            class_ids: HashMap::new(),
            entries: Vec::new(),
        }
    }

    /// Returns false if `R` was already registered
    pub fn add_object<R: Replicable + Default>(&mut self) -> bool {
        let type_id = TypeId::of::<R>();
        if self.class_ids.contains_key(&type_id) {
            return false;
        }
        let class_id = self.entries.len() as ClassId;
        self.class_ids.insert(type_id, class_id);
        self.entries.push(ObjectEntry {
            name: type_name::<R>(),
            create: create_boxed::<R>,
        });
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn class_id_of(&self, object: &dyn Replicable) -> Option<ClassId> {
        self.class_ids.get(&object.as_any().type_id()).copied()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    pub fn bit_size(&self) -> u8 {
        bits_required(self.entries.len() as u32)
    }

    pub fn write_class_id(&self, writer: &mut dyn BitWrite, class_id: ClassId) {
        write_bits(writer, u32::from(class_id), self.bit_size());
    }

    pub fn read_class_id(&self, reader: &mut BitReader) -> Result<ClassId, SerdeErr> {
        Ok(read_bits(reader, self.bit_size())? as ClassId)
    }

    /// A default-constructed object of kind `class_id`
    pub fn create(&self, class_id: ClassId) -> Option<Box<dyn Replicable>> {
        self.entries
            .get(class_id as usize)
            .map(|entry| (entry.create)())
    }
}

impl Default for ObjectKinds {
    fn default() -> Self {
        Self::new()
    }
}
