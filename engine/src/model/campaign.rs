//! Campaigns and their sections.

use super::{adopt_ids, link_all, Child};
use crate::{Entity, RemoteId};
use serde::{Deserialize, Serialize};

/// A tabletop campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Campaign {
    pub title: String,
    pub concept: String,
    pub genre: Option<String>,
    /// Theme colors as hex strings (`#2b1d3a`)
    pub primary_color: Option<String>,
    pub secondary_color: Option<String>,
    pub image_urls: Vec<String>,
    pub sections: Vec<Section>,
}

/// A chapter/section of a campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct Section {
    pub id: Option<RemoteId>,
    /// Back-reference to the owning campaign
    pub campaign_id: Option<RemoteId>,
    pub title: String,
    pub content: String,
    pub position: u32,
}

impl Campaign {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Append a section at the end, not yet known to the server.
    pub fn add_section(&mut self, title: impl Into<String>, content: impl Into<String>) {
        let position = self.sections.len() as u32;
        self.sections.push(Section {
            id: None,
            campaign_id: None,
            title: title.into(),
            content: content.into(),
            position,
        });
    }

    pub fn section(&self, id: RemoteId) -> Option<&Section> {
        self.sections.iter().find(|s| s.id == Some(id))
    }

    pub fn section_mut(&mut self, id: RemoteId) -> Option<&mut Section> {
        self.sections.iter_mut().find(|s| s.id == Some(id))
    }

    /// Remove a section and close the gap in positions.
    pub fn remove_section(&mut self, id: RemoteId) -> Option<Section> {
        let index = self.sections.iter().position(|s| s.id == Some(id))?;
        let removed = self.sections.remove(index);
        for (position, section) in self.sections.iter_mut().enumerate() {
            section.position = position as u32;
        }
        Some(removed)
    }
}

impl Child for Section {
    fn id(&self) -> Option<RemoteId> {
        self.id
    }

    fn parent_id(&self) -> Option<RemoteId> {
        self.campaign_id
    }

    fn set_ids(&mut self, id: Option<RemoteId>, parent_id: Option<RemoteId>) {
        self.id = id;
        self.campaign_id = parent_id;
    }
}

impl Entity for Campaign {
    const COLLECTION: &'static str = "campaigns";

    fn link_children(&mut self, parent_id: RemoteId, next_id: &mut dyn FnMut() -> RemoteId) {
        link_all(&mut self.sections, parent_id, next_id);
    }

    fn adopt_child_ids(&mut self, sent: &Self, stored: &Self) {
        adopt_ids(&mut self.sections, &sent.sections, &stored.sections);
    }
}
