//! Mixer editor
//!
//! Cursor logic behind the mapping editor screen. Rows are the mappings of
//! every bus in bus order, full mappings first; a bus without mappings
//! shows a single placeholder row so it can still be selected and given
//! one. Below the rows sits the `Internal` entry (the way back out).
//!
//! The editor never touches playback. It edits the [`MappingModel`]; the
//! owner notices the change and reconciles routes and gains.

use super::selection::{EditorAction, Group, Selection, SelectionKind};
use crate::error::RouteError;
use crate::graph::GraphSnapshot;
use crate::mapping::gain::{decrement_db, increment_db};
use crate::mapping::{Direction, Mapping, MappingKey, MappingModel};

/// Cursor state of the mapping editor
#[derive(Debug, Clone)]
pub struct MixerEditor {
    selection: Selection,
    group: Group,
    rows: Vec<Selection>,
}

impl Default for MixerEditor {
    fn default() -> Self {
        Self::new()
    }
}

impl MixerEditor {
    pub fn new() -> Self {
        Self {
            selection: Selection::Internal,
            group: Group::TargetNode,
            rows: Vec::new(),
        }
    }

    pub fn selection(&self) -> Selection {
        self.selection
    }

    pub fn group(&self) -> Group {
        self.group
    }

    pub fn rows(&self) -> &[Selection] {
        &self.rows
    }

    /// Index of the selected row; `None` on the internal entry.
    pub fn selected_row(&self) -> Option<usize> {
        self.rows.iter().position(|r| r.same_row(&self.selection))
    }

    /// Put the cursor on a row (or the internal entry).
    pub fn select(&mut self, selection: Selection) -> bool {
        let target = match selection {
            Selection::Internal => Selection::Internal,
            _ => match self.rows.iter().find(|r| r.same_row(&selection)) {
                Some(row) => *row,
                None => return false,
            },
        };
        self.set_selection(target);
        true
    }

    /// Rebuild the rows from the model.
    ///
    /// The selection follows its mapping (its gain may have changed); when
    /// the mapping is gone the cursor falls back to the first row.
    pub fn refresh(&mut self, model: &MappingModel) {
        self.rows.clear();
        for entry in model.bus_mappings() {
            if entry.is_empty() {
                self.rows.push(Selection::None(entry.bus.id));
            } else {
                self.rows.extend(entry.mappings().map(Selection::Mapping));
            }
        }

        if self.selection == Selection::Internal {
            return;
        }
        let selection = self
            .rows
            .iter()
            .find(|r| r.same_row(&self.selection))
            .or_else(|| self.rows.first())
            .copied()
            .unwrap_or(Selection::Internal);
        self.set_selection(selection);
    }

    fn set_selection(&mut self, selection: Selection) {
        self.selection = selection;
        if selection.kind() == SelectionKind::Full && !self.group.is_legal(SelectionKind::Full) {
            self.group = Group::TargetNode;
        }
    }

    /// Apply one input. Returns whether anything changed.
    pub fn handle(
        &mut self,
        action: EditorAction,
        model: &mut MappingModel,
        snapshot: &GraphSnapshot,
    ) -> bool {
        match action {
            EditorAction::Up => self.move_selection(false),
            EditorAction::Down => self.move_selection(true),
            EditorAction::NextGroup | EditorAction::PrevGroup => {
                let kind = self.selection.kind();
                if !matches!(kind, SelectionKind::Full | SelectionKind::Channel) {
                    return false;
                }
                self.group = if action == EditorAction::NextGroup {
                    self.group.next(kind)
                } else {
                    self.group.previous(kind)
                };
                true
            }
            EditorAction::Left => self.adjust(Direction::Backward, model, snapshot),
            EditorAction::Right => self.adjust(Direction::Forward, model, snapshot),
            EditorAction::Clear => self.clear(model),
            EditorAction::AddFull => {
                let Some(bus) = self.selection.bus() else {
                    return false;
                };
                let Some(target) = model.find_first_available_target(bus, snapshot) else {
                    return false;
                };
                self.apply(model.add_full(bus, target, snapshot), model)
            }
            EditorAction::AddChannel => {
                let Some(bus) = self.selection.bus() else {
                    return false;
                };
                let Some((guest_channel, target, target_channel)) =
                    model.find_first_available_channel_target(bus, snapshot)
                else {
                    return false;
                };
                self.apply(
                    model.add_channel(bus, guest_channel, target, target_channel, snapshot),
                    model,
                )
            }
        }
    }

    fn move_selection(&mut self, down: bool) -> bool {
        let next = match self.selected_row() {
            None if self.rows.is_empty() => Selection::Internal,
            None if down => self.rows[0],
            None => self.rows[self.rows.len() - 1],
            Some(index) if down => self
                .rows
                .get(index + 1)
                .copied()
                .unwrap_or(Selection::Internal),
            Some(0) => Selection::Internal,
            Some(index) => self.rows[index - 1],
        };
        if next.same_row(&self.selection) {
            return false;
        }
        self.set_selection(next);
        true
    }

    fn adjust(&mut self, direction: Direction, model: &mut MappingModel, snapshot: &GraphSnapshot) -> bool {
        let Some(key) = self.selection.key() else {
            return false;
        };

        let replacement = match (self.group, key) {
            (Group::Gain, _) => {
                let Some(current) = model.mapping(&key) else {
                    return false;
                };
                let db = match direction {
                    Direction::Forward => increment_db(current.gain_db),
                    Direction::Backward => decrement_db(current.gain_db),
                };
                if db == current.gain_db || model.set_gain(&key, db).is_none() {
                    return false;
                }
                self.refresh(model);
                return true;
            }
            (Group::TargetNode, MappingKey::Full { bus, target }) => {
                let found = match direction {
                    Direction::Forward => model.find_next_available_target(bus, target, snapshot),
                    Direction::Backward => model.find_previous_available_target(bus, target, snapshot),
                };
                found.map(|t| key.with_target(t))
            }
            (
                Group::TargetNode,
                MappingKey::Channel {
                    bus,
                    guest_channel,
                    target,
                    target_channel,
                },
            ) => {
                let found = match direction {
                    Direction::Forward => model.find_next_available_channel_target(
                        bus,
                        guest_channel,
                        target,
                        target_channel,
                        snapshot,
                    ),
                    Direction::Backward => model.find_previous_available_channel_target(
                        bus,
                        guest_channel,
                        target,
                        target_channel,
                        snapshot,
                    ),
                };
                found.map(|t| key.with_target(t))
            }
            (
                Group::GuestChannel,
                MappingKey::Channel {
                    bus,
                    target,
                    target_channel,
                    ..
                },
            ) => model
                .find_guest_channel(&key, direction, snapshot)
                .map(|guest_channel| MappingKey::Channel {
                    bus,
                    guest_channel,
                    target,
                    target_channel,
                }),
            (
                Group::TargetChannel,
                MappingKey::Channel {
                    bus,
                    guest_channel,
                    target,
                    ..
                },
            ) => model
                .find_target_channel(&key, direction, snapshot)
                .map(|target_channel| MappingKey::Channel {
                    bus,
                    guest_channel,
                    target,
                    target_channel,
                }),
            _ => None,
        };

        match replacement {
            Some(new) => self.apply(model.replace(&key, new, snapshot), model),
            None => false,
        }
    }

    fn apply(
        &mut self,
        result: Result<Mapping, RouteError>,
        model: &MappingModel,
    ) -> bool {
        match result {
            Ok(mapping) => {
                self.selection = Selection::Mapping(mapping);
                self.refresh(model);
                true
            }
            Err(e) => {
                log::debug!("Editor action refused: {}", e);
                false
            }
        }
    }

    fn clear(&mut self, model: &mut MappingModel) -> bool {
        let (Some(key), Some(index)) = (self.selection.key(), self.selected_row()) else {
            return false;
        };
        let bus = key.bus();
        let same_bus = |row: Option<&Selection>| row.copied().filter(|r| r.bus() == Some(bus));
        let next = same_bus(self.rows.get(index + 1))
            .or_else(|| same_bus(index.checked_sub(1).and_then(|i| self.rows.get(i))))
            .unwrap_or(Selection::None(bus));

        if model.remove(&key).is_none() {
            return false;
        }
        self.selection = next;
        self.refresh(model);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{DeviceGraph, EndpointId, EndpointKind, PortDirection};
    use crate::mapping::{BusId, SpeakerBus, Target};
    use std::sync::Arc;

    /// "Speakers" (default) and "Headphones", both stereo.
    fn graph() -> Arc<DeviceGraph> {
        let graph = DeviceGraph::new();
        graph.insert_endpoint(40, EndpointKind::Sink, "Speakers", "alsa.out", None);
        graph.insert_channel(40, PortDirection::Input, 0, "FL");
        graph.insert_channel(40, PortDirection::Input, 1, "FR");
        graph.insert_endpoint(50, EndpointKind::Sink, "Headphones", "usb.dac", None);
        graph.insert_channel(50, PortDirection::Input, 0, "FL");
        graph.insert_channel(50, PortDirection::Input, 1, "FR");
        graph.set_default(EndpointKind::Sink, "alsa.out");
        graph
    }

    fn setup() -> (Arc<DeviceGraph>, MappingModel, BusId, MixerEditor) {
        let mut model = MappingModel::new();
        let bus = model.add_bus("lspeaker", SpeakerBus::front());
        let mut editor = MixerEditor::new();
        editor.refresh(&model);
        (graph(), model, bus, editor)
    }

    #[test]
    fn test_empty_bus_shows_placeholder() {
        let (_, model, bus, mut editor) = setup();
        assert_eq!(editor.rows(), &[Selection::None(bus)]);
        assert_eq!(editor.selection(), Selection::Internal);
        editor.refresh(&model);
        assert_eq!(editor.selection(), Selection::Internal);
    }

    #[test]
    fn test_removing_only_mapping_leaves_placeholder() {
        let (graph, mut model, bus, mut editor) = setup();
        let snap = graph.snapshot();

        assert!(editor.handle(EditorAction::Down, &mut model, &snap));
        assert!(editor.handle(EditorAction::AddFull, &mut model, &snap));
        let added = editor.selection();
        assert_eq!(added.kind(), SelectionKind::Full);
        assert_eq!(added.key().unwrap().target(), Target::Default);
        assert_eq!(editor.rows().len(), 1);

        assert!(editor.handle(EditorAction::Clear, &mut model, &snap));
        assert_eq!(editor.selection(), Selection::None(bus));
        assert_eq!(editor.rows(), &[Selection::None(bus)]);
        assert!(model.mappings_for(bus).is_empty());
        assert!(!editor.handle(EditorAction::Clear, &mut model, &snap));
    }

    #[test]
    fn test_clear_reselects_within_bus() {
        let (graph, mut model, bus, mut editor) = setup();
        let snap = graph.snapshot();
        let other = model.add_bus("rspeaker", SpeakerBus::rear());
        model.add_full(bus, Target::Default, &snap).unwrap();
        let second = model.add_full(bus, Target::Endpoint(EndpointId(1)), &snap).unwrap();
        let third = model.add_full(other, Target::Default, &snap).unwrap();
        editor.refresh(&model);
        assert_eq!(editor.rows().len(), 3);

        // first row: the next row of the same bus takes over
        editor.handle(EditorAction::Down, &mut model, &snap);
        assert!(editor.handle(EditorAction::Clear, &mut model, &snap));
        assert_eq!(editor.selection().key(), Some(second.key));

        // last row of its bus: never jumps to the other bus
        assert!(editor.handle(EditorAction::Clear, &mut model, &snap));
        assert_eq!(editor.selection(), Selection::None(bus));
        assert_eq!(editor.rows()[1].key(), Some(third.key));
    }

    #[test]
    fn test_up_down_wrap_through_internal() {
        let (graph, mut model, bus, mut editor) = setup();
        let snap = graph.snapshot();
        let other = model.add_bus("rspeaker", SpeakerBus::rear());
        editor.refresh(&model);

        assert!(editor.handle(EditorAction::Up, &mut model, &snap));
        assert_eq!(editor.selection(), Selection::None(other));
        assert!(editor.handle(EditorAction::Up, &mut model, &snap));
        assert_eq!(editor.selection(), Selection::None(bus));
        assert!(editor.handle(EditorAction::Up, &mut model, &snap));
        assert_eq!(editor.selection(), Selection::Internal);
        assert!(editor.handle(EditorAction::Down, &mut model, &snap));
        assert_eq!(editor.selection(), Selection::None(bus));
        assert_eq!(editor.selected_row(), Some(0));
    }

    #[test]
    fn test_target_node_walks_available_targets() {
        let (graph, mut model, _, mut editor) = setup();
        let snap = graph.snapshot();
        editor.handle(EditorAction::Down, &mut model, &snap);
        editor.handle(EditorAction::AddFull, &mut model, &snap);

        assert!(editor.handle(EditorAction::Right, &mut model, &snap));
        assert_eq!(
            editor.selection().key().unwrap().target(),
            Target::Endpoint(EndpointId(1))
        );
        assert!(editor.handle(EditorAction::Right, &mut model, &snap));
        assert_eq!(
            editor.selection().key().unwrap().target(),
            Target::Endpoint(EndpointId(2))
        );
        // wraps back onto the free default
        assert!(editor.handle(EditorAction::Right, &mut model, &snap));
        assert_eq!(editor.selection().key().unwrap().target(), Target::Default);
        assert!(editor.handle(EditorAction::Left, &mut model, &snap));
        assert!(editor.handle(EditorAction::Left, &mut model, &snap));
        assert_eq!(
            editor.selection().key().unwrap().target(),
            Target::Endpoint(EndpointId(1))
        );
        assert_eq!(editor.rows().len(), 1);

        // every target taken: adjusting is a no-op
        assert!(editor.handle(EditorAction::AddFull, &mut model, &snap));
        assert!(editor.handle(EditorAction::AddFull, &mut model, &snap));
        assert_eq!(
            editor.selection().key().unwrap().target(),
            Target::Endpoint(EndpointId(2))
        );
        assert!(!editor.handle(EditorAction::Right, &mut model, &snap));
        assert!(!editor.handle(EditorAction::AddFull, &mut model, &snap));
        assert_eq!(editor.rows().len(), 3);
    }

    #[test]
    fn test_gain_group_steps_grid() {
        let (graph, mut model, _, mut editor) = setup();
        let snap = graph.snapshot();
        editor.handle(EditorAction::Down, &mut model, &snap);
        editor.handle(EditorAction::AddFull, &mut model, &snap);
        assert!(editor.handle(EditorAction::NextGroup, &mut model, &snap));
        assert_eq!(editor.group(), Group::Gain);

        let key = editor.selection().key().unwrap();
        assert!(editor.handle(EditorAction::Right, &mut model, &snap));
        assert_eq!(model.mapping(&key).unwrap().gain_db, 0.5);
        assert_eq!(editor.selection().gain_db(), 0.5);
        for _ in 0..3 {
            editor.handle(EditorAction::Left, &mut model, &snap);
        }
        assert_eq!(model.mapping(&key).unwrap().gain_db, -1.0);
    }

    #[test]
    fn test_channel_groups_cycle_axes() {
        let (graph, mut model, bus, mut editor) = setup();
        let snap = graph.snapshot();
        editor.handle(EditorAction::Down, &mut model, &snap);
        assert!(editor.handle(EditorAction::AddChannel, &mut model, &snap));
        assert_eq!(editor.selection().kind(), SelectionKind::Channel);

        // node -> target channel
        editor.handle(EditorAction::NextGroup, &mut model, &snap);
        assert_eq!(editor.group(), Group::TargetChannel);
        assert!(editor.handle(EditorAction::Right, &mut model, &snap));
        assert_eq!(
            editor.selection().key(),
            Some(MappingKey::Channel {
                bus,
                guest_channel: 0,
                target: Target::Default,
                target_channel: 1,
            })
        );

        // target channel -> gain -> guest channel
        editor.handle(EditorAction::NextGroup, &mut model, &snap);
        editor.handle(EditorAction::NextGroup, &mut model, &snap);
        assert_eq!(editor.group(), Group::GuestChannel);
        assert!(editor.handle(EditorAction::Left, &mut model, &snap));
        assert_eq!(
            editor.selection().key(),
            Some(MappingKey::Channel {
                bus,
                guest_channel: 1,
                target: Target::Default,
                target_channel: 1,
            })
        );
        assert_eq!(model.mappings_for(bus).len(), 1);
    }

    #[test]
    fn test_full_row_forces_node_group() {
        let (graph, mut model, bus, mut editor) = setup();
        let snap = graph.snapshot();
        model.add_channel(bus, 0, Target::Default, 0, &snap).unwrap();
        model.add_full(bus, Target::Default, &snap).unwrap();
        editor.refresh(&model);

        // rows: full, channel
        editor.handle(EditorAction::Up, &mut model, &snap);
        assert_eq!(editor.selection().kind(), SelectionKind::Channel);
        editor.handle(EditorAction::PrevGroup, &mut model, &snap);
        assert_eq!(editor.group(), Group::GuestChannel);

        editor.handle(EditorAction::Up, &mut model, &snap);
        assert_eq!(editor.selection().kind(), SelectionKind::Full);
        assert_eq!(editor.group(), Group::TargetNode);
    }

    #[test]
    fn test_internal_rejects_edits() {
        let (graph, mut model, _, mut editor) = setup();
        let snap = graph.snapshot();
        for action in [
            EditorAction::AddFull,
            EditorAction::AddChannel,
            EditorAction::Clear,
            EditorAction::Left,
            EditorAction::NextGroup,
        ] {
            assert!(!editor.handle(action, &mut model, &snap));
        }
        assert_eq!(model.all_mappings().count(), 0);
    }
}
