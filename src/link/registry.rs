//! Link table: which slots are open and who receives their data.
//!
//! Indexed directly by link number. Ids are handed out in increasing order
//! and never reused within a boot, so a stale id held by a torn-down
//! facade can never alias a newer link.

use crate::drivers::radio::{LinkId, LinkKind};
use crate::endpoint::Endpoint;
use crate::error::LinkError;

/// Size of the link table, reserved links included.
pub const MAX_LINKS: usize = 8;

/// First id handed out by [`LinkTable::allocate`]; lower ids are reserved.
pub const FIRST_DYNAMIC_LINK: u8 = 2;

/// Receiver of inbound frames on one link.
pub type DataCallback = Box<dyn FnMut(Endpoint, &[u8])>;

/// Data routing for one link.
pub enum Route {
    /// No callback: console bytes go to the line accumulator, anything
    /// else is dropped.
    Unregistered,
    Callback(DataCallback),
}

/// An open link.
pub struct LinkEntry {
    pub kind: LinkKind,
    pub local_port: u16,
    pub max_clients: Option<u8>,
    route: Route,
}

impl LinkEntry {
    pub fn has_callback(&self) -> bool {
        matches!(self.route, Route::Callback(_))
    }
}

pub struct LinkTable {
    entries: [Option<LinkEntry>; MAX_LINKS],
    next: u8,
}

impl Default for LinkTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkTable {
    pub fn new() -> Self {
        Self {
            entries: core::array::from_fn(|_| None),
            next: FIRST_DYNAMIC_LINK,
        }
    }

    /// Open one of the reserved low-numbered links.
    pub fn reserve(&mut self, id: LinkId, kind: LinkKind, local_port: u16) {
        if let Some(slot) = self.entries.get_mut(id.0 as usize) {
            let route = slot.take().map_or(Route::Unregistered, |e| e.route);
            *slot = Some(LinkEntry {
                kind,
                local_port,
                max_clients: None,
                route,
            });
        }
    }

    /// Claim the next dynamic link id.
    pub fn allocate(&mut self, kind: LinkKind, local_port: u16, max_clients: Option<u8>) -> Result<LinkId, LinkError> {
        let idx = self.next as usize;
        if idx >= MAX_LINKS {
            return Err(LinkError::LinksExhausted);
        }
        self.next += 1;
        self.entries[idx] = Some(LinkEntry {
            kind,
            local_port,
            max_clients,
            route: Route::Unregistered,
        });
        Ok(LinkId(idx as u8))
    }

    /// Close a link. Its id stays retired.
    pub fn remove(&mut self, id: LinkId) -> Option<LinkEntry> {
        self.entries.get_mut(id.0 as usize).and_then(Option::take)
    }

    pub fn get(&self, id: LinkId) -> Option<&LinkEntry> {
        self.entries.get(id.0 as usize).and_then(Option::as_ref)
    }

    pub fn contains(&self, id: LinkId) -> bool {
        self.get(id).is_some()
    }

    /// Install (or replace) the data callback of an open link.
    pub fn register(&mut self, id: LinkId, callback: DataCallback) -> Result<(), LinkError> {
        let entry = self
            .entries
            .get_mut(id.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(LinkError::UnknownLink(id.0))?;
        entry.route = Route::Callback(callback);
        Ok(())
    }

    pub fn deregister(&mut self, id: LinkId) {
        if let Some(entry) = self.entries.get_mut(id.0 as usize).and_then(Option::as_mut) {
            entry.route = Route::Unregistered;
        }
    }

    pub fn callback_mut(&mut self, id: LinkId) -> Option<&mut DataCallback> {
        match self.entries.get_mut(id.0 as usize)? {
            Some(LinkEntry {
                route: Route::Callback(cb),
                ..
            }) => Some(cb),
            _ => None,
        }
    }

    /// Open dynamic links, in id order.
    pub fn dynamic(&self) -> impl Iterator<Item = (LinkId, &LinkEntry)> {
        self.entries
            .iter()
            .enumerate()
            .skip(FIRST_DYNAMIC_LINK as usize)
            .filter_map(|(i, e)| e.as_ref().map(|e| (LinkId(i as u8), e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn ids_increase_and_are_never_reused() {
        let mut t = LinkTable::new();
        let a = t.allocate(LinkKind::TcpServer, 80, Some(4)).unwrap();
        let b = t.allocate(LinkKind::TcpServer, 81, None).unwrap();
        assert_eq!((a, b), (LinkId(2), LinkId(3)));
        t.remove(a);
        let c = t.allocate(LinkKind::TcpServer, 82, None).unwrap();
        assert_eq!(c, LinkId(4));
        assert!(!t.contains(a));
    }

    #[test]
    fn allocation_stops_at_table_size() {
        let mut t = LinkTable::new();
        for _ in FIRST_DYNAMIC_LINK as usize..MAX_LINKS {
            t.allocate(LinkKind::Udp, 1, None).unwrap();
        }
        assert_eq!(
            t.allocate(LinkKind::Udp, 1, None),
            Err(LinkError::LinksExhausted)
        );
    }

    #[test]
    fn register_requires_open_link() {
        let mut t = LinkTable::new();
        assert_eq!(
            t.register(LinkId(5), Box::new(|_, _| {})).unwrap_err(),
            LinkError::UnknownLink(5)
        );
    }

    #[test]
    fn callbacks_can_be_replaced_and_removed() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut t = LinkTable::new();
        let id = t.allocate(LinkKind::TcpServer, 80, None).unwrap();

        let h = hits.clone();
        t.register(id, Box::new(move |_, d| h.borrow_mut().push(("first", d.to_vec()))))
            .unwrap();
        let h = hits.clone();
        t.register(id, Box::new(move |_, d| h.borrow_mut().push(("second", d.to_vec()))))
            .unwrap();

        (t.callback_mut(id).unwrap())(Endpoint::default(), b"x");
        assert_eq!(*hits.borrow(), vec![("second", b"x".to_vec())]);

        t.deregister(id);
        assert!(t.callback_mut(id).is_none());
        assert!(!t.get(id).unwrap().has_callback());
    }

    #[test]
    fn reserve_keeps_existing_callback() {
        let mut t = LinkTable::new();
        t.reserve(LinkId(1), LinkKind::TcpServer, 2222);
        t.register(LinkId(1), Box::new(|_, _| {})).unwrap();
        t.reserve(LinkId(1), LinkKind::TcpServer, 2222);
        assert!(t.get(LinkId(1)).unwrap().has_callback());
        assert_eq!(t.dynamic().count(), 0);
    }
}
