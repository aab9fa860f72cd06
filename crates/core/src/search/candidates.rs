//! Candidate index built from one batch of search responses.

use std::collections::HashMap;

use crate::fileshare::{PeerResponse, RemoteFile};
use crate::library::QualityProfile;
use crate::matcher::matches_filetype;

/// Filetypes to try, most preferred first.
///
/// Allowed profile entries in listed order, lower-cased, then reversed.
pub fn filetype_priority(profile: &QualityProfile) -> Vec<String> {
    profile
        .items
        .iter()
        .filter(|item| item.allowed)
        .map(|item| item.filetype_name.to_lowercase())
        .rev()
        .collect()
}

/// First blacklist word contained (case-insensitively) in `title`.
pub fn blacklisted_word<'a>(title: &str, blacklist: &'a [String]) -> Option<&'a str> {
    let title = title.to_lowercase();
    blacklist
        .iter()
        .map(|w| w.trim())
        .find(|w| !w.is_empty() && title.contains(&w.to_lowercase()))
}

#[derive(Debug, Default)]
struct PeerCandidates {
    peer: String,
    by_filetype: HashMap<String, Vec<RemoteFile>>,
}

/// Peer → filetype → files, with peers kept in first-seen order.
#[derive(Debug, Default)]
pub struct CandidateIndex {
    peers: Vec<PeerCandidates>,
}

impl CandidateIndex {
    /// Index every file under each filetype whose extension it carries.
    pub fn build(responses: &[PeerResponse], filetypes: &[String]) -> Self {
        let mut index = CandidateIndex::default();
        let mut positions: HashMap<String, usize> = HashMap::new();

        for response in responses {
            for file in &response.files {
                for filetype in filetypes {
                    if !matches_filetype(file, filetype) {
                        continue;
                    }
                    let slot = *positions.entry(response.peer.clone()).or_insert_with(|| {
                        index.peers.push(PeerCandidates {
                            peer: response.peer.clone(),
                            by_filetype: HashMap::new(),
                        });
                        index.peers.len() - 1
                    });
                    index.peers[slot]
                        .by_filetype
                        .entry(filetype.clone())
                        .or_default()
                        .push(file.clone());
                }
            }
        }

        index
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Peers holding at least one file of `filetype`, in first-seen order.
    pub fn peers_with(&self, filetype: &str) -> impl Iterator<Item = &str> {
        let filetype = filetype.to_string();
        self.peers
            .iter()
            .filter(move |p| p.by_filetype.contains_key(&filetype))
            .map(|p| p.peer.as_str())
    }

    pub fn candidates(&self, peer: &str, filetype: &str) -> &[RemoteFile] {
        self.peers
            .iter()
            .find(|p| p.peer == peer)
            .and_then(|p| p.by_filetype.get(filetype))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Distinct remote directories holding candidates, in first-seen order.
    pub fn directories(&self, peer: &str, filetype: &str) -> Vec<String> {
        let mut dirs: Vec<String> = Vec::new();
        for file in self.candidates(peer, filetype) {
            let dir = file.directory();
            if !dirs.iter().any(|d| d == dir) {
                dirs.push(dir.to_string());
            }
        }
        dirs
    }
}
