mod common;

use std::rc::Rc;
use std::time::Duration;

use common::{M, RecModule, RecPhase};
use tickstage::demo::{self, MatchSettings, ScoreboardModule};
use tickstage::{Game, Manifest, ParticipantId, TokioScheduler};

async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test(start_paused = true)]
async fn tokio_driver_ticks_at_the_configured_period() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = Rc::new(TokioScheduler::new());
            let game = Game::builder()
                .scheduler(scheduler.clone())
                .tick_period(Duration::from_millis(20))
                .build();
            game.set_phase(RecPhase::new("A").needs(Manifest::new().create::<RecModule<M>>()));
            game.start().unwrap();
            let module = game.module::<RecModule<M>>().unwrap();

            for _ in 0..3 {
                tokio::time::advance(Duration::from_millis(20)).await;
                settle().await;
            }
            assert_eq!(module.borrow().ticks, 3);

            game.stop().unwrap();
            assert_eq!(scheduler.task_count(), 0);
            tokio::time::advance(Duration::from_millis(100)).await;
            settle().await;
            assert_eq!(module.borrow().ticks, 3);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn phase_stopping_itself_ends_the_driver() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let scheduler = Rc::new(TokioScheduler::new());
            let game = Game::builder()
                .scheduler(scheduler.clone())
                .tick_period(Duration::from_millis(5))
                .build();
            let mut ticks = 0;
            game.set_phase(RecPhase::new("A").ticking(move |game| {
                ticks += 1;
                if ticks == 4 {
                    game.stop().unwrap();
                }
            }));
            game.start().unwrap();

            while game.is_running() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            assert_eq!(common::count("A.on_tick"), 4);
            assert_eq!(common::count("A.on_exit:stop"), 1);
            assert_eq!(scheduler.task_count(), 0);
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn demo_match_plays_to_the_end() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let settings = MatchSettings {
                countdown_ticks: 3,
                round_ticks: 500,
                win_hold_ticks: 2,
                fuse_ticks: 4,
                seed: 7,
            };
            let game = demo::build_match(
                &settings,
                Game::builder()
                    .scheduler(Rc::new(TokioScheduler::new()))
                    .tick_period(Duration::from_millis(10)),
            );
            for _ in 0..5 {
                game.add_participant(ParticipantId::new());
            }
            game.start().unwrap();

            while game.is_running() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            assert!(game.take_escalated().is_empty());

            let board = game.module::<ScoreboardModule>().unwrap();
            let board = board.borrow();
            assert_eq!(board.rounds(), 1);
            assert_eq!(board.eliminations(), 4);
            assert!(board.last_winner().is_some());
        })
        .await;
}
