//! Event/value registry, decoder chain, and handler dispatch
//!
//! `NetDec` is the hub a capture loop feeds frames into. Decoders are built
//! from an explicit constructor list in two phases: construction assigns
//! every decoder's own events and values, then `setup` lets each decoder
//! resolve value IDs published by the decoders before it. Per packet, the
//! chain runs from the ethernet decoder until a decoder declines to route
//! further, after which queued events fan out to bound handlers.

use std::collections::HashMap;

use tracing::{debug, trace};

use crate::config::Config;
use crate::decode;
use crate::error::{HornetError, Result};
use crate::property::Property;

pub type EvId = usize;
pub type ValId = usize;

/// Renders an attribute slot for display.
pub type ValueFormatter = fn(&[u8]) -> String;

struct EventDef {
    name: String,
    #[allow(dead_code)]
    desc: String,
}

struct ValueDef {
    name: String,
    #[allow(dead_code)]
    desc: String,
    fmt: Option<ValueFormatter>,
}

/// Interns event and value definitions. Decoders assign their own names at
/// construction and look up foreign names at setup; a failed lookup is a
/// fatal configuration error.
#[derive(Default)]
pub struct Registry {
    events: Vec<EventDef>,
    event_ids: HashMap<String, EvId>,
    values: Vec<ValueDef>,
    value_ids: HashMap<String, ValId>,
}

impl Registry {
    pub fn assign_event(&mut self, name: &str, desc: &str) -> EvId {
        if let Some(&id) = self.event_ids.get(name) {
            return id;
        }
        let id = self.events.len();
        self.events.push(EventDef {
            name: name.to_string(),
            desc: desc.to_string(),
        });
        self.event_ids.insert(name.to_string(), id);
        id
    }

    pub fn assign_value(&mut self, name: &str, desc: &str) -> ValId {
        self.assign_value_inner(name, desc, None)
    }

    /// Assign a value with a display formatter attached to its definition.
    pub fn assign_value_with(&mut self, name: &str, desc: &str, fmt: ValueFormatter) -> ValId {
        self.assign_value_inner(name, desc, Some(fmt))
    }

    fn assign_value_inner(&mut self, name: &str, desc: &str, fmt: Option<ValueFormatter>) -> ValId {
        if let Some(&id) = self.value_ids.get(name) {
            return id;
        }
        let id = self.values.len();
        self.values.push(ValueDef {
            name: name.to_string(),
            desc: desc.to_string(),
            fmt,
        });
        self.value_ids.insert(name.to_string(), id);
        id
    }

    pub fn lookup_event_id(&self, name: &str) -> Result<EvId> {
        self.event_ids
            .get(name)
            .copied()
            .ok_or_else(|| HornetError::UnknownEvent(name.to_string()))
    }

    pub fn lookup_value_id(&self, name: &str) -> Result<ValId> {
        self.value_ids
            .get(name)
            .copied()
            .ok_or_else(|| HornetError::UnknownValue(name.to_string()))
    }

    pub fn event_name(&self, id: EvId) -> Option<&str> {
        self.events.get(id).map(|e| e.name.as_str())
    }

    pub fn value_name(&self, id: ValId) -> Option<&str> {
        self.values.get(id).map(|v| v.name.as_str())
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Render the value of `id` on this packet, via the formatter attached
    /// at assignment (hex fallback for plain values).
    pub fn repr(&self, id: ValId, p: &Property) -> Option<String> {
        let bytes = p.get_bytes(id)?;
        match self.values.get(id).and_then(|v| v.fmt) {
            Some(fmt) => Some(fmt(bytes)),
            None => Some(
                bytes
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<Vec<_>>()
                    .join(""),
            ),
        }
    }
}

/// One protocol decoder in the chain.
pub trait Decoder {
    fn name(&self) -> &'static str;

    /// Resolve value IDs published by upstream decoders. Missing IDs are a
    /// fatal configuration error.
    fn setup(&mut self, _reg: &Registry) -> Result<()> {
        Ok(())
    }

    /// Decode one layer: consume header bytes, record attributes, queue
    /// events. Returns the name of the decoder that should handle the rest
    /// of the frame, or `None` to end the chain. A frame that does not parse
    /// at this layer ends the chain silently.
    fn decode(&mut self, p: &mut Property) -> Option<&'static str>;
}

/// Receives events after the chain finishes with a packet.
pub trait Handler {
    fn recv(&mut self, ev: EvId, p: &Property, reg: &Registry);
}

/// Decoder registry and per-packet dispatcher. Each `NetDec` owns its own
/// decoders (and therefore its own session tables); nothing is shared
/// between instances.
pub struct NetDec {
    reg: Registry,
    decoders: Vec<Box<dyn Decoder>>,
    decoder_ids: HashMap<&'static str, usize>,
    entry: usize,
    handlers: HashMap<EvId, Vec<Box<dyn Handler>>>,
    prop: Property,
}

impl NetDec {
    pub fn new(config: &Config) -> Result<Self> {
        let mut reg = Registry::default();
        let mut decoders = decode::build(&mut reg, config);

        for d in &mut decoders {
            d.setup(&reg)?;
        }

        let mut decoder_ids = HashMap::new();
        for (i, d) in decoders.iter().enumerate() {
            decoder_ids.insert(d.name(), i);
        }
        let entry = *decoder_ids
            .get(decode::ENTRY)
            .ok_or_else(|| HornetError::UnknownDecoder(decode::ENTRY.to_string()))?;

        debug!(
            decoders = decoders.len(),
            events = reg.events.len(),
            values = reg.values.len(),
            "decoder chain ready"
        );

        let prop = Property::new(reg.value_count());
        Ok(Self {
            reg,
            decoders,
            decoder_ids,
            entry,
            handlers: HashMap::new(),
            prop,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.reg
    }

    /// Bind a handler to an event by name.
    pub fn bind_handler(&mut self, event: &str, handler: Box<dyn Handler>) -> Result<()> {
        let id = self.reg.lookup_event_id(event)?;
        self.handlers.entry(id).or_default().push(handler);
        Ok(())
    }

    /// Run one frame through the chain and deliver its events.
    pub fn input(&mut self, data: &[u8], tv_sec: i64) {
        self.prop.init(data, tv_sec);

        let mut cur = self.entry;
        loop {
            let next = self.decoders[cur].decode(&mut self.prop);
            match next.and_then(|name| self.decoder_ids.get(name)) {
                Some(&idx) => cur = idx,
                None => break,
            }
        }

        for i in 0..self.prop.events().len() {
            let ev = self.prop.events()[i];
            trace!(event = self.reg.event_name(ev).unwrap_or("?"), "deliver");
            if let Some(bound) = self.handlers.get_mut(&ev) {
                for h in bound {
                    h.recv(ev, &self.prop, &self.reg);
                }
            }
        }
    }
}
