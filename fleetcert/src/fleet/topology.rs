//! Fleet topology derived from per-device neighbor lists.

use std::collections::{HashMap, HashSet};

use crate::device::{DeviceRecord, InterfaceLink};

/// Links of every device, including links only declared by the peer.
#[derive(Debug, Clone, Default)]
pub struct Topology {
    members: HashSet<String>,
    links: HashMap<String, Vec<InterfaceLink>>,
}

impl Topology {
    /// Build the topology of a fleet.
    ///
    /// A link declared on one side only is added to the other side too,
    /// unless that side already has a link on the same local interface.
    pub fn new(records: &[DeviceRecord]) -> Self {
        let members: HashSet<String> = records.iter().map(|r| r.name.clone()).collect();
        let mut links: HashMap<String, Vec<InterfaceLink>> = HashMap::new();

        for record in records {
            let own = links.entry(record.name.clone()).or_default();
            for neighbor in &record.neighbors {
                own.push(InterfaceLink {
                    interface: neighbor.port.clone(),
                    peer_device: neighbor.neighbor_device.clone(),
                    peer_interface: neighbor.neighbor_port.clone(),
                    peer_in_fleet: members.contains(&neighbor.neighbor_device),
                });
            }
        }

        for record in records {
            for neighbor in &record.neighbors {
                if !members.contains(&neighbor.neighbor_device) {
                    continue;
                }
                let peer = links.entry(neighbor.neighbor_device.clone()).or_default();
                if peer.iter().any(|l| l.interface == neighbor.neighbor_port) {
                    continue;
                }
                peer.push(InterfaceLink {
                    interface: neighbor.neighbor_port.clone(),
                    peer_device: record.name.clone(),
                    peer_interface: neighbor.port.clone(),
                    peer_in_fleet: true,
                });
            }
        }

        Self { members, links }
    }

    /// Whether a device is part of the fleet.
    pub fn contains(&self, device: &str) -> bool {
        self.members.contains(device)
    }

    /// Links of a device; empty for unknown devices.
    pub fn interfaces(&self, device: &str) -> Vec<InterfaceLink> {
        self.links.get(device).cloned().unwrap_or_default()
    }

    /// Fleet members adjacent to a device.
    pub fn peers(&self, device: &str) -> Vec<&str> {
        self.links
            .get(device)
            .into_iter()
            .flatten()
            .filter(|l| l.peer_in_fleet)
            .map(|l| l.peer_device.as_str())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fleet() -> Vec<DeviceRecord> {
        vec![
            DeviceRecord::new("leaf1", "10.0.0.11", "admin", "admin")
                .with_neighbor("Ethernet1", "spine1", "Ethernet1")
                .with_neighbor("Ethernet48", "server7", "eth0"),
            DeviceRecord::new("spine1", "10.0.0.1", "admin", "admin")
                .with_neighbor("Ethernet1", "leaf1", "Ethernet1"),
            DeviceRecord::new("leaf2", "10.0.0.12", "admin", "admin")
                .with_neighbor("Ethernet1", "spine1", "Ethernet2"),
        ]
    }

    #[test]
    fn test_own_links_flag_fleet_membership() {
        let topology = Topology::new(&fleet());
        let links = topology.interfaces("leaf1");

        assert_eq!(links.len(), 2);
        assert_eq!(links[0].peer_device, "spine1");
        assert!(links[0].peer_in_fleet);
        assert_eq!(links[1].peer_device, "server7");
        assert!(!links[1].peer_in_fleet);
    }

    #[test]
    fn test_one_sided_link_is_mirrored() {
        let topology = Topology::new(&fleet());
        let links = topology.interfaces("spine1");

        // Ethernet1 declared on both sides, Ethernet2 only by leaf2
        assert_eq!(links.len(), 2);
        assert_eq!(links[1].interface, "Ethernet2");
        assert_eq!(links[1].peer_device, "leaf2");
        assert_eq!(links[1].peer_interface, "Ethernet1");
        assert_eq!(topology.peers("spine1"), vec!["leaf1", "leaf2"]);
    }

    #[test]
    fn test_unknown_device_has_no_links() {
        let topology = Topology::new(&fleet());
        assert!(!topology.contains("server7"));
        assert!(topology.interfaces("server7").is_empty());
    }
}
