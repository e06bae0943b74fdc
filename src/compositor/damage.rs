//! Damage-to-redraw pipeline

use anyhow::Result;
use tracing::debug;
use x11rb::protocol::xproto::Rectangle;

use crate::consumer::Consumer;
use crate::server::{DisplayServer, WindowId};
use crate::wm::Session;

impl<S: DisplayServer, C: Consumer> Session<S, C> {
    /// Turn one damage notification into one redraw of exactly `area`.
    ///
    /// The damage is subtracted afterwards even when nothing was drawn, since
    /// the server reports nothing further until it is.
    pub fn on_damage(&mut self, window: WindowId, area: Rectangle) -> Result<()> {
        let Some(entity) = self.registry.get_mut(window) else {
            return Ok(());
        };

        match entity.ensure_pixmap(&self.server)? {
            Some(pixmap) => {
                let visual = entity.attrs().visual;
                self.consumer.redraw(entity.content(), pixmap, visual, area);
            }
            None => debug!("Damage on 0x{:x} without a pixmap, skipping", window),
        }

        if let Some(damage) = entity.damage() {
            self.server.subtract_damage(damage)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::MapState;
    use crate::testing::{Call, DAMAGE_BASE, FakeServer, Record, unmapped, viewable};
    use crate::wm::events::raw;
    use crate::wm::tests::start;

    const WIN: WindowId = 0x0120_0001;

    fn area() -> Rectangle {
        Rectangle {
            x: 12,
            y: 4,
            width: 33,
            height: 9,
        }
    }

    #[test]
    fn test_damage_on_untracked_window_does_nothing() {
        let mut session = start(FakeServer::new());
        session.consumer_mut().take();
        session.server().clear_calls();

        session.on_damage(WIN, area()).unwrap();
        assert!(session.consumer().records.is_empty());
        assert!(session.server().calls().is_empty());
    }

    #[test]
    fn test_one_redraw_per_notification_then_subtract() {
        let server = FakeServer::new();
        server.add_window(WIN, viewable(0, 0, 100, 100));
        let mut session = start(server);
        session.consumer_mut().take();
        session.server().clear_calls();

        let raw = raw::damage(DAMAGE_BASE, WIN, area());
        session.handle_raw(&raw).unwrap();
        session.handle_raw(&raw).unwrap();

        let redraws: Vec<Rectangle> = session
            .consumer_mut()
            .take()
            .into_iter()
            .map(|r| match r {
                Record::Redraw { dirty, .. } => dirty,
                other => panic!("Unexpected record {:?}", other),
            })
            .collect();
        assert_eq!(redraws, vec![area(), area()]);

        let damage = session.registry().get(WIN).unwrap().damage().unwrap();
        assert_eq!(
            session.server().calls(),
            vec![Call::SubtractDamage(damage), Call::SubtractDamage(damage)]
        );
    }

    #[test]
    fn test_damage_while_unmapped_skips_redraw() {
        let server = FakeServer::new();
        server.add_window(WIN, unmapped(0, 0, 100, 100));
        let mut session = start(server);
        session.consumer_mut().take();

        session.on_damage(WIN, area()).unwrap();
        assert!(session.consumer().records.is_empty());
        assert_eq!(session.server().count(|c| matches!(c, Call::SubtractDamage(_))), 1);

        // Names the pixmap lazily once the window becomes viewable
        session.server().set_map_state(WIN, MapState::Viewable);
        session.on_damage(WIN, area()).unwrap();
        assert_eq!(session.consumer().records.len(), 1);
        assert!(session.registry().get(WIN).unwrap().pixmap().is_some());
    }
}
