use crate::model::WorkerId;
use anyhow::{bail, Context};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use uuid::Uuid;

/// Point de reprise optionnel : le planning et l'ensemble verrouillé des
/// obligatoires. Le aller-retour JSON préserve les invariants ; la
/// persistance est portée par le point de reprise lui-même.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub schedule: BTreeMap<NaiveDate, Vec<Option<WorkerId>>>,
    pub locked_mandatory: BTreeSet<(WorkerId, NaiveDate)>,
}

impl Checkpoint {
    pub fn new(
        schedule: BTreeMap<NaiveDate, Vec<Option<WorkerId>>>,
        locked_mandatory: BTreeSet<(WorkerId, NaiveDate)>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            schedule,
            locked_mandatory,
        }
    }

    /// Cohérence structurelle minimale, contrôlée à l'écriture comme à la
    /// lecture : largeur de postes uniforme, verrous matérialisés.
    fn sanity_check(&self) -> anyhow::Result<()> {
        let mut widths = self.schedule.values().map(Vec::len);
        if let Some(first) = widths.next() {
            if widths.any(|w| w != first) {
                bail!("ragged post vectors across dates");
            }
        }
        for (id, date) in &self.locked_mandatory {
            let present = self
                .schedule
                .get(date)
                .map(|posts| posts.iter().flatten().any(|w| w == id))
                .unwrap_or(false);
            if !present {
                bail!("locked mandatory {id}@{date} absent from schedule");
            }
        }
        Ok(())
    }

    /// Charge un point de reprise et contrôle sa cohérence interne.
    pub fn load_from<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let data = fs::read(path)
            .with_context(|| format!("checkpoint {} unreadable", path.display()))?;
        let checkpoint: Checkpoint = serde_json::from_slice(&data)
            .with_context(|| format!("checkpoint {} is not valid JSON", path.display()))?;
        checkpoint
            .sanity_check()
            .with_context(|| format!("checkpoint {} is inconsistent", path.display()))?;
        Ok(checkpoint)
    }

    /// Écriture atomique : fichier de travail étiqueté par l'id du point de
    /// reprise dans le répertoire cible, synchronisé puis renommé.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        self.sanity_check()
            .context("refusing to persist an inconsistent checkpoint")?;
        let path = path.as_ref();
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let tag = self.id.get(..8).unwrap_or(self.id.as_str());

        let mut work = tempfile::Builder::new()
            .prefix(".checkpoint-")
            .suffix(&format!(".{tag}"))
            .tempfile_in(dir)
            .with_context(|| format!("no writable working file in {}", dir.display()))?;
        serde_json::to_writer_pretty(work.as_file_mut(), self)
            .context("serializing checkpoint")?;
        work.as_file().sync_all()?;
        work.persist(path)
            .with_context(|| format!("could not move checkpoint into {}", path.display()))?;
        Ok(())
    }
}
