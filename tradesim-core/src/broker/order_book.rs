//! Order book: arena of every order plus the id queues the broker scans.
//!
//! Orders are never removed: terminal orders stay for audit. Queues hold ids
//! only, so cascades triggered mid-scan (OCO, bracket) just flip statuses and
//! the scan skips whatever is no longer alive.

use crate::domain::{Order, OrderId};
use std::collections::{BTreeMap, HashMap, VecDeque};

#[derive(Debug, Default)]
pub struct OrderBook {
    orders: BTreeMap<OrderId, Order>,
    /// Awaiting the pre-trade cash check.
    submitted: VecDeque<OrderId>,
    /// Accepted and waiting to match, in arrival order.
    pending: Vec<OrderId>,
    /// Bracket children released by a parent fill, activated next tick.
    to_activate: Vec<OrderId>,
    /// Bracket root (the parent's id) → parent (until it completes) and children.
    brackets: HashMap<OrderId, Vec<OrderId>>,
    /// OCO leader → members.
    oco_groups: HashMap<OrderId, Vec<OrderId>>,
}

impl OrderBook {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Lookup ─────────────────────────────────────────────────────────

    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.orders.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: OrderId) -> Option<&mut Order> {
        self.orders.get_mut(&id)
    }

    pub fn len(&self) -> usize {
        self.orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.orders.is_empty()
    }

    /// Every order ever submitted, by id.
    pub fn orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values()
    }

    /// Orders that can still execute.
    pub fn open_orders(&self) -> impl Iterator<Item = &Order> {
        self.orders.values().filter(|o| o.is_alive())
    }

    pub(crate) fn is_alive(&self, id: OrderId) -> bool {
        self.orders.get(&id).is_some_and(|o| o.is_alive())
    }

    pub(crate) fn insert(&mut self, order: Order) {
        self.orders.insert(order.id, order);
    }

    // ── Queues ─────────────────────────────────────────────────────────

    pub(crate) fn push_submitted(&mut self, id: OrderId) {
        self.submitted.push_back(id);
    }

    pub(crate) fn take_submitted(&mut self) -> VecDeque<OrderId> {
        std::mem::take(&mut self.submitted)
    }

    pub(crate) fn push_pending(&mut self, id: OrderId) {
        self.pending.push(id);
    }

    pub(crate) fn take_pending(&mut self) -> Vec<OrderId> {
        std::mem::take(&mut self.pending)
    }

    /// Restores the pending queue after a scan, keeping anything queued
    /// during the scan behind the survivors.
    pub(crate) fn restore_pending(&mut self, mut survivors: Vec<OrderId>) {
        let added = std::mem::take(&mut self.pending);
        survivors.extend(added);
        let orders = &self.orders;
        survivors.retain(|id| orders.get(id).is_some_and(|o| o.is_alive()));
        self.pending = survivors;
    }

    pub(crate) fn push_to_activate(&mut self, id: OrderId) {
        self.to_activate.push(id);
    }

    pub(crate) fn take_to_activate(&mut self) -> Vec<OrderId> {
        std::mem::take(&mut self.to_activate)
    }

    // ── Brackets ───────────────────────────────────────────────────────

    pub(crate) fn has_bracket(&self, root: OrderId) -> bool {
        self.brackets.contains_key(&root)
    }

    /// Adds `id` to the bracket rooted at `root`, creating it when `id` is
    /// the root itself.
    pub(crate) fn join_bracket(&mut self, id: OrderId, root: OrderId) {
        self.brackets.entry(root).or_default().push(id);
    }

    pub(crate) fn bracket_members(&self, root: OrderId) -> Vec<OrderId> {
        self.brackets.get(&root).cloned().unwrap_or_default()
    }

    /// Dissolves the group and returns its remaining members.
    pub(crate) fn take_bracket(&mut self, root: OrderId) -> Vec<OrderId> {
        self.brackets.remove(&root).unwrap_or_default()
    }

    /// Removes the completed parent and returns the children left to release.
    /// A group with no children is dropped.
    pub(crate) fn release_children(&mut self, root: OrderId) -> Vec<OrderId> {
        let Some(members) = self.brackets.get_mut(&root) else {
            return Vec::new();
        };
        members.retain(|id| *id != root);
        let children = members.clone();
        if children.is_empty() {
            self.brackets.remove(&root);
        }
        children
    }

    // ── OCO groups ─────────────────────────────────────────────────────

    /// Places `id` in the OCO group of `with` (or its own group) and returns
    /// the group leader. `None` if `with` is unknown.
    pub(crate) fn join_oco(&mut self, id: OrderId, with: Option<OrderId>) -> Option<OrderId> {
        let leader = match with {
            None => id,
            Some(other) => self.orders.get(&other)?.oco_group.unwrap_or(other),
        };
        self.oco_groups.entry(leader).or_default().push(id);
        Some(leader)
    }

    /// Dissolves an OCO group, returning its members.
    pub(crate) fn take_oco_group(&mut self, leader: OrderId) -> Vec<OrderId> {
        self.oco_groups.remove(&leader).unwrap_or_default()
    }
}
