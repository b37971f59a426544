use crate::mapping::{BusId, Mapping, MappingKey};

/// Kind of the selected row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionKind {
    None,
    Full,
    Channel,
    Internal,
}

/// What the editor cursor is on
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Selection {
    /// Placeholder row of a bus that has no mapping
    None(BusId),
    Mapping(Mapping),
    /// A row that is not a mapping (navigation entries below the list)
    Internal,
}

impl Selection {
    pub fn kind(&self) -> SelectionKind {
        match self {
            Selection::None(_) => SelectionKind::None,
            Selection::Mapping(m) if m.key.is_full() => SelectionKind::Full,
            Selection::Mapping(_) => SelectionKind::Channel,
            Selection::Internal => SelectionKind::Internal,
        }
    }

    pub fn bus(&self) -> Option<BusId> {
        match self {
            Selection::None(bus) => Some(*bus),
            Selection::Mapping(m) => Some(m.key.bus()),
            Selection::Internal => None,
        }
    }

    pub fn key(&self) -> Option<MappingKey> {
        match self {
            Selection::Mapping(m) => Some(m.key),
            _ => None,
        }
    }

    pub fn gain_db(&self) -> f32 {
        match self {
            Selection::Mapping(m) => m.gain_db,
            _ => 0.0,
        }
    }

    /// Same row, whatever the gain.
    pub fn same_row(&self, other: &Selection) -> bool {
        match (self, other) {
            (Selection::None(a), Selection::None(b)) => a == b,
            (Selection::Mapping(a), Selection::Mapping(b)) => a.key == b.key,
            (Selection::Internal, Selection::Internal) => true,
            _ => false,
        }
    }
}

/// Field of the selected mapping being edited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Group {
    GuestChannel,
    TargetNode,
    TargetChannel,
    Gain,
}

impl Group {
    /// Next field in cursor order. Full mappings only have node and gain.
    pub fn next(self, kind: SelectionKind) -> Group {
        match (kind, self) {
            (SelectionKind::Full, Group::TargetNode) => Group::Gain,
            (SelectionKind::Full, _) => Group::TargetNode,
            (_, Group::TargetNode) => Group::TargetChannel,
            (_, Group::TargetChannel) => Group::Gain,
            (_, Group::Gain) => Group::GuestChannel,
            (_, Group::GuestChannel) => Group::TargetNode,
        }
    }

    pub fn previous(self, kind: SelectionKind) -> Group {
        match (kind, self) {
            (SelectionKind::Full, Group::TargetNode) => Group::Gain,
            (SelectionKind::Full, _) => Group::TargetNode,
            (_, Group::TargetNode) => Group::GuestChannel,
            (_, Group::GuestChannel) => Group::Gain,
            (_, Group::Gain) => Group::TargetChannel,
            (_, Group::TargetChannel) => Group::TargetNode,
        }
    }

    /// Whether the field exists on rows of `kind`.
    pub fn is_legal(self, kind: SelectionKind) -> bool {
        match kind {
            SelectionKind::Full => matches!(self, Group::TargetNode | Group::Gain),
            SelectionKind::Channel => true,
            SelectionKind::None | SelectionKind::Internal => false,
        }
    }
}

/// Input to the editor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditorAction {
    Up,
    Down,
    NextGroup,
    PrevGroup,
    /// Adjust the active field downwards
    Left,
    /// Adjust the active field upwards
    Right,
    /// Remove the selected mapping
    Clear,
    AddFull,
    AddChannel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_group_cycles() {
        let mut group = Group::TargetNode;
        let mut seen = Vec::new();
        for _ in 0..4 {
            group = group.next(SelectionKind::Channel);
            seen.push(group);
        }
        assert_eq!(
            seen,
            vec![Group::TargetChannel, Group::Gain, Group::GuestChannel, Group::TargetNode]
        );
        for expected in seen.iter().rev().skip(1) {
            group = group.previous(SelectionKind::Channel);
            assert_eq!(group, *expected);
        }

        assert_eq!(Group::TargetNode.next(SelectionKind::Full), Group::Gain);
        assert_eq!(Group::Gain.next(SelectionKind::Full), Group::TargetNode);
        assert_eq!(Group::Gain.previous(SelectionKind::Full), Group::TargetNode);
        assert!(!Group::GuestChannel.is_legal(SelectionKind::Full));
    }
}
