// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module turns the `queues`, `exchanges` and `routing` sections of the
//! configuration tree into collections of live topology members, and installs
//! a whole topology on the broker.
//!
//! The main components are:
//! - `TopologyMember` trait: what a queue, an exchange or a binding must offer
//! - `CollectionConfig`: a collection section after expansion, before building
//! - `Collection`: the built members plus the collection-level options
//! - `Topology`: a view over the three collections that declares them in order

use crate::{
    component::ComponentId,
    connection::Connection,
    descriptor::{self, ComponentKind, Descriptor, AUTO_DECLARE_KEY},
    errors::AmqpError,
    exchange::Exchange,
    queue::Queue,
    routing::Routing,
};
use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, slice, sync::Arc};
use tracing::debug;

/// A queue, exchange or routing binding built from a descriptor.
#[async_trait]
pub trait TopologyMember: Send + Sync + Sized + 'static {
    /// The collection this member belongs to.
    const KIND: ComponentKind;

    /// Builds a member from its merged descriptor.
    fn from_descriptor(
        descriptor: &Descriptor,
        connection: Arc<Connection>,
        owner: ComponentId,
    ) -> Result<Self, AmqpError>;

    /// Name used to look the member up in its collection.
    fn name(&self) -> &str;

    /// Whether the member declares itself right after being built.
    fn auto_declare(&self) -> bool;

    /// Creates the member on the broker.
    async fn declare(&self) -> Result<(), AmqpError>;
}

/// One entry of a collection section.
pub enum Member<T> {
    /// Descriptor still to be merged with the member defaults and built
    Descriptor(Descriptor),
    /// Instance built elsewhere, kept as is
    Prebuilt(Arc<T>),
}

impl<T> fmt::Debug for Member<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Member::Descriptor(descriptor) => {
                f.debug_tuple("Descriptor").field(descriptor).finish()
            }
            Member::Prebuilt(_) => f.write_str("Prebuilt"),
        }
    }
}

/// A collection section split into shared options and members.
#[derive(Debug)]
pub struct CollectionConfig<T> {
    pub(crate) options: Descriptor,
    pub(crate) members: Vec<Member<T>>,
}

impl<T: TopologyMember> CollectionConfig<T> {
    /// Expands a collection value and merges its options over the defaults.
    pub fn from_value(value: Value) -> Result<CollectionConfig<T>, AmqpError> {
        let (options, members) = descriptor::expand(T::KIND, value)?;

        Ok(CollectionConfig {
            options: descriptor::merge(&T::KIND.defaults(), &options),
            members: members.into_iter().map(Member::Descriptor).collect(),
        })
    }

    /// Collection-level options.
    pub fn options(&self) -> &Descriptor {
        &self.options
    }

    /// Members in declaration order.
    pub fn members(&self) -> &[Member<T>] {
        &self.members
    }

    pub(crate) fn push(&mut self, member: Member<T>) {
        self.members.push(member);
    }

    /// Builds every member against `connection`.
    ///
    /// Descriptor members are merged as `defaults ⊕ {autoDeclare} ⊕ entry`,
    /// built, and declared right away when their auto-declare flag is set.
    /// Pre-built members are passed through untouched.
    pub(crate) async fn build(
        self,
        auto_declare: bool,
        connection: &Arc<Connection>,
        owner: &ComponentId,
    ) -> Result<Collection<T>, AmqpError> {
        let mut flag = Descriptor::new();
        flag.insert(AUTO_DECLARE_KEY.to_owned(), Value::Bool(auto_declare));
        let defaults = descriptor::merge(&T::KIND.member_defaults(), &flag);

        let mut items = Vec::with_capacity(self.members.len());
        for member in self.members {
            let item = match member {
                Member::Prebuilt(item) => item,
                Member::Descriptor(entry) => {
                    let merged = descriptor::merge(&defaults, &entry);
                    let item = T::from_descriptor(&merged, connection.clone(), owner.clone())?;
                    if item.auto_declare() {
                        debug!(kind = T::KIND.as_str(), name = item.name(), "auto declaring");
                        item.declare().await?;
                    }
                    Arc::new(item)
                }
            };
            items.push(item);
        }

        Ok(Collection {
            options: self.options,
            items,
        })
    }
}

/// Built members of one collection.
#[derive(Debug)]
pub struct Collection<T> {
    options: Descriptor,
    items: Vec<Arc<T>>,
}

impl<T: TopologyMember> Collection<T> {
    /// Collection-level options.
    pub fn options(&self) -> &Descriptor {
        &self.options
    }

    /// Number of built members, pre-built ones included.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Member at `index`, in declaration order.
    pub fn get(&self, index: usize) -> Option<&Arc<T>> {
        self.items.get(index)
    }

    pub fn iter(&self) -> slice::Iter<'_, Arc<T>> {
        self.items.iter()
    }

    /// First member with the given name.
    pub fn find(&self, name: &str) -> Option<&Arc<T>> {
        self.items.iter().find(|item| item.name() == name)
    }

    /// Declares every member, in order.
    pub async fn declare_all(&self) -> Result<(), AmqpError> {
        for item in &self.items {
            item.declare().await?;
        }
        Ok(())
    }
}

impl<'a, T> IntoIterator for &'a Collection<T> {
    type Item = &'a Arc<T>;
    type IntoIter = slice::Iter<'a, Arc<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// View over the three collections of a component.
pub struct Topology<'tp> {
    exchanges: &'tp Collection<Exchange>,
    queues: &'tp Collection<Queue>,
    routing: &'tp Collection<Routing>,
}

impl<'tp> Topology<'tp> {
    pub fn new(
        exchanges: &'tp Collection<Exchange>,
        queues: &'tp Collection<Queue>,
        routing: &'tp Collection<Routing>,
    ) -> Topology<'tp> {
        Topology {
            exchanges,
            queues,
            routing,
        }
    }

    /// Installs the topology to the RabbitMQ server.
    ///
    /// Exchanges are declared first, then queues, then the bindings between
    /// them, so every binding finds both of its ends.
    pub async fn install(&self) -> Result<(), AmqpError> {
        debug!(
            exchanges = self.exchanges.len(),
            queues = self.queues.len(),
            bindings = self.routing.len(),
            "installing topology"
        );
        self.exchanges.declare_all().await?;
        self.queues.declare_all().await?;
        self.routing.declare_all().await
    }
}
