use crate::{
    element::{Element, ElementId, ElementPayload},
    render::RenderItem,
    WorkbenchError,
};

/// Ordered collection of elements. Insertion order is display order.
#[derive(Debug, Default, Clone)]
pub struct ElementRegistry {
    elements: Vec<Element>,
    next_id: u64,
}

impl ElementRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an element and return its identifier.
    ///
    /// Names are not checked; stage outputs are unique by construction of their suffixes.
    pub fn add(&mut self, payload: impl Into<ElementPayload>, name: impl Into<String>) -> ElementId {
        let id = ElementId(self.next_id);
        self.next_id += 1;
        let element = Element::new(id, name.into(), payload.into());
        log::debug!("registry: add {} {:?}", id, element.name());
        self.elements.push(element);
        id
    }

    /// Append a captured frame under a user supplied name.
    ///
    /// # Errors
    ///
    /// Returns [`WorkbenchError::DuplicateOrEmptyName`] if the name is empty or already used;
    /// nothing is inserted in that case.
    pub fn add_from_capture(
        &mut self,
        payload: impl Into<ElementPayload>,
        name: &str,
    ) -> Result<ElementId, WorkbenchError> {
        if name.is_empty() || self.contains_name(name) {
            return Err(WorkbenchError::DuplicateOrEmptyName(name.to_string()));
        }
        Ok(self.add(payload, name))
    }

    /// Remove every selected element. Returns the number of removed elements.
    pub fn remove_selected(&mut self) -> usize {
        let before = self.elements.len();
        self.elements.retain(|e| !e.is_selected());
        before - self.elements.len()
    }

    /// Remove every element. Returns the number of removed elements.
    pub fn remove_all(&mut self) -> usize {
        let removed = self.elements.len();
        self.elements.clear();
        removed
    }

    /// Select every element.
    pub fn select_all(&mut self) {
        self.elements.iter_mut().for_each(|e| e.set_selected(true));
    }

    /// Unselect every element.
    pub fn unselect_all(&mut self) {
        self.elements.iter_mut().for_each(|e| e.set_selected(false));
    }

    /// Set the selection flag of the element at `index`.
    ///
    /// An out of range index is ignored.
    pub fn set_selected(&mut self, index: usize, selected: bool) {
        match self.elements.get_mut(index) {
            Some(element) => element.set_selected(selected),
            None => log::debug!(
                "registry: ignoring selection of row {index}, only {} rows",
                self.elements.len()
            ),
        }
    }

    /// The selected elements in registry order. The first one is the source of pair stages.
    pub fn selected(&self) -> Vec<&Element> {
        self.elements.iter().filter(|e| e.is_selected()).collect()
    }

    /// Number of elements.
    #[inline]
    pub fn count(&self) -> usize {
        self.elements.len()
    }

    /// Whether the registry holds no element.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Name of the element at `index`.
    pub fn name_at(&self, index: usize) -> Option<&str> {
        self.elements.get(index).map(|e| e.name())
    }

    /// Selection flag of the element at `index`.
    pub fn is_selected_at(&self, index: usize) -> Option<bool> {
        self.elements.get(index).map(|e| e.is_selected())
    }

    /// The element at `index`.
    pub fn get(&self, index: usize) -> Option<&Element> {
        self.elements.get(index)
    }

    /// The element with identifier `id`.
    pub fn find(&self, id: ElementId) -> Option<&Element> {
        self.elements.iter().find(|e| e.id() == id)
    }

    /// Iterate over the elements in display order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    /// Whether an element is named `name`.
    pub fn contains_name(&self, name: &str) -> bool {
        self.elements.iter().any(|e| e.name() == name)
    }

    /// The registry as handed to a renderer; selected elements are the visible ones.
    pub fn render_items(&self) -> Vec<RenderItem<'_>> {
        self.elements
            .iter()
            .map(|e| RenderItem {
                name: e.name(),
                payload: e.payload(),
                visible: e.is_selected(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoscan_3d::pointcloud::PointCloud;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn cloud(x: f64) -> PointCloud {
        PointCloud::from_points(vec![[x, 0.0, 0.0]])
    }

    #[test]
    fn test_capture_names() {
        let mut registry = ElementRegistry::new();
        assert!(registry.add_from_capture(cloud(0.0), "scan").is_ok());

        assert!(matches!(
            registry.add_from_capture(cloud(1.0), "scan"),
            Err(WorkbenchError::DuplicateOrEmptyName(name)) if name == "scan"
        ));
        assert!(matches!(
            registry.add_from_capture(cloud(1.0), ""),
            Err(WorkbenchError::DuplicateOrEmptyName(_))
        ));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_selection_and_removal() {
        let mut registry = ElementRegistry::new();
        let ids: Vec<_> = ["a", "b", "c", "d"]
            .iter()
            .enumerate()
            .map(|(i, name)| registry.add(cloud(i as f64), *name))
            .collect();
        assert!(ids.windows(2).all(|w| w[0] < w[1]));

        registry.set_selected(3, true);
        registry.set_selected(1, true);
        registry.set_selected(42, true);
        let names: Vec<_> = registry.selected().iter().map(|e| e.name()).collect();
        assert_eq!(names, ["b", "d"]);

        assert_eq!(registry.remove_selected(), 2);
        assert_eq!(registry.count(), 2);
        assert_eq!(registry.name_at(1), Some("c"));
        assert_eq!(registry.is_selected_at(1), Some(false));
        assert_eq!(registry.name_at(2), None);

        // identifiers are not reused after removal
        let e = registry.add(cloud(9.0), "e");
        assert!(e > ids[3]);
        assert_eq!(registry.find(e).map(|e| e.name()), Some("e"));

        registry.select_all();
        assert_eq!(registry.selected().len(), 3);
        assert!(registry.render_items().iter().all(|item| item.visible));
        registry.unselect_all();
        assert!(registry.selected().is_empty());

        assert_eq!(registry.remove_all(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_random_operations_keep_counts() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut registry = ElementRegistry::new();
        let mut expected = 0usize;

        for step in 0..500 {
            match rng.random_range(0..5) {
                0 | 1 => {
                    registry.add(cloud(step as f64), format!("e{step}"));
                    expected += 1;
                }
                2 => {
                    let index = rng.random_range(0..registry.count() + 2);
                    registry.set_selected(index, rng.random::<bool>());
                }
                3 => expected -= registry.remove_selected(),
                _ => {
                    if rng.random::<f64>() < 0.05 {
                        expected -= registry.remove_all();
                    }
                }
            }
            assert_eq!(registry.count(), expected);

            // selected() is an order preserving subsequence of the listing
            let all: Vec<_> = registry.iter().map(|e| e.id()).collect();
            let mut cursor = all.iter();
            for element in registry.selected() {
                assert!(element.is_selected());
                assert!(cursor.any(|&id| id == element.id()));
            }
        }
    }
}
