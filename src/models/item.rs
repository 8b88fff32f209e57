use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    Artifact,
    Secret,
    Gpu,
    Vpn,
    Soft,
    Mat,
    Unknown,
}

/// Display metadata for an ERC-1155 id of the game contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ItemMeta {
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub stats: &'static str,
}

const fn meta(name: &'static str, kind: ItemKind, stats: &'static str) -> ItemMeta {
    ItemMeta { name, kind, stats }
}

pub fn item_metadata(id: u64) -> ItemMeta {
    match id {
        1 => meta("Lost Sector", ItemKind::Artifact, "10 $HASH"),
        2 => meta("Encoded Fragment", ItemKind::Artifact, "50 $HASH"),
        3 => meta("Encrypted Data", ItemKind::Artifact, "200 $HASH"),
        4 => meta("Root Access", ItemKind::Artifact, "1000 $HASH"),
        5 => meta("Genesis Block", ItemKind::Artifact, "5000 $HASH"),
        99 => meta("Corrupted Core", ItemKind::Secret, "LIMIT BREAK MATERIAL"),
        101 => meta("Integrated Chip", ItemKind::Gpu, "Speed -1s"),
        102 => meta("Mining Rig v1", ItemKind::Gpu, "Speed -2s"),
        103 => meta("Quantum Core", ItemKind::Gpu, "Speed -3s"),
        201 => meta("Free Proxy", ItemKind::Vpn, "Luck +500"),
        202 => meta("Private Node", ItemKind::Vpn, "Luck +2000"),
        203 => meta("Military Uplink", ItemKind::Vpn, "Luck +5000"),
        301 => meta("Script Kiddie", ItemKind::Soft, "Luck +1000"),
        302 => meta("Black Hat Tool", ItemKind::Soft, "Luck +3000"),
        401 => meta("Overclock Chip", ItemKind::Mat, "Enchant Material"),
        _ => meta("Unknown", ItemKind::Unknown, "?"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::INVENTORY_ITEM_IDS;

    #[test]
    fn every_inventory_id_has_metadata() {
        for id in INVENTORY_ITEM_IDS {
            assert_ne!(item_metadata(id).kind, ItemKind::Unknown, "id {}", id);
        }
        assert_eq!(item_metadata(7).name, "Unknown");
    }

    #[test]
    fn serializes_kind_as_type() {
        let json = serde_json::to_value(item_metadata(103)).unwrap();
        assert_eq!(json["type"], "GPU");
        assert_eq!(json["name"], "Quantum Core");
    }
}
