//! Small problems shared by the planner's tests.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use strips_core::{Action, Formula, Predicate, Problem, Stream, Type};

fn step_action(at: &Predicate, adjacent: &Predicate, pos: &Type) -> Action {
    let p1 = pos.param("P1");
    let p2 = pos.param("P2");
    Action::new(
        "step",
        vec![p1.clone(), p2.clone()],
        Formula::and([
            Formula::from(at.atom([&p1]).unwrap()),
            Formula::from(adjacent.atom([&p1, &p2]).unwrap()),
        ]),
        Formula::and([
            Formula::from(at.atom([&p2]).unwrap()),
            Formula::not(at.atom([&p1]).unwrap()),
        ]),
    )
    .unwrap()
}

/// Walk from 0 to 3 over fixed edges 0-1, 1-2, 2-3 and 0-2.
pub fn walker() -> (Problem, Type) {
    let pos = Type::new("POS");
    let at = Predicate::new("At", [pos.clone()]);
    let adjacent = Predicate::new("Adjacent", [pos.clone(), pos.clone()]);
    let edge = |a: i64, b: i64| adjacent.fact([pos.object(a), pos.object(b)]).unwrap();
    let problem = Problem::builder()
        .initial(at.fact([pos.object(0)]).unwrap())
        .initials([edge(0, 1), edge(1, 2), edge(2, 3), edge(0, 2)])
        .goal(at.fact([pos.object(3)]).unwrap())
        .action(step_action(&at, &adjacent, &pos))
        .build()
        .unwrap();
    (problem, pos)
}

fn next_stream(adjacent: &Predicate, pos: &Type, limit: Option<i64>) -> Stream {
    let p1 = pos.param("P1");
    let p2 = pos.param("P2");
    let ty = pos.clone();
    Stream::builder("next")
        .input(p1.clone())
        .output(p2.clone())
        .effect(adjacent.atom([&p1, &p2]).unwrap())
        .generator(move |inputs| {
            let from = inputs[0].as_int().unwrap_or(0);
            let open = limit.map_or(true, |limit| from < limit);
            open.then(|| vec![ty.object(from + 1)])
        })
        .build()
        .unwrap()
}

/// Walk from 0 to 3 where edges `p -> p + 1` come from a lazy generator.
///
/// With `limit`, the generator yields nothing for inputs at or above it.
pub fn lazy_walker(limit: Option<i64>) -> (Problem, Type) {
    let pos = Type::new("POS");
    let at = Predicate::new("At", [pos.clone()]);
    let adjacent = Predicate::new("Adjacent", [pos.clone(), pos.clone()]);
    let problem = Problem::builder()
        .initial(at.fact([pos.object(0)]).unwrap())
        .goal(at.fact([pos.object(3)]).unwrap())
        .action(step_action(&at, &adjacent, &pos))
        .stream(next_stream(&adjacent, &pos, limit))
        .build()
        .unwrap();
    (problem, pos)
}

/// [`lazy_walker`] plus a lazy test certifying `Ok(P)` for every pose,
/// read by a `look` action that does not help reach the goal.
pub fn watched_walker(limit: Option<i64>) -> Problem {
    let pos = Type::new("POS");
    let at = Predicate::new("At", [pos.clone()]);
    let adjacent = Predicate::new("Adjacent", [pos.clone(), pos.clone()]);
    let ok = Predicate::new("Ok", [pos.clone()]);
    let seen = Predicate::new("Seen", [pos.clone()]);
    let p = pos.param("P");
    let look = Action::new(
        "look",
        vec![p.clone()],
        ok.atom([&p]).unwrap(),
        seen.atom([&p]).unwrap(),
    )
    .unwrap();
    let check = Stream::builder("check")
        .input(p.clone())
        .effect(ok.atom([&p]).unwrap())
        .test(|_| true)
        .build()
        .unwrap();
    Problem::builder()
        .initial(at.fact([pos.object(0)]).unwrap())
        .goal(at.fact([pos.object(3)]).unwrap())
        .action(step_action(&at, &adjacent, &pos))
        .action(look)
        .stream(next_stream(&adjacent, &pos, limit))
        .stream(check)
        .build()
        .unwrap()
}

/// Reach pose 5 through a configuration produced by an IK generator.
pub fn reach() -> (Problem, Type, Type) {
    let pos = Type::new("POS");
    let conf = Type::new("CONF");
    let kin = Predicate::new("Kin", [pos.clone(), conf.clone()]);
    let reached = Predicate::new("Reached", [pos.clone()]);
    let p = pos.param("P");
    let q = conf.param("Q");
    let go = Action::new(
        "go",
        vec![p.clone(), q.clone()],
        kin.atom([&p, &q]).unwrap(),
        reached.atom([&p]).unwrap(),
    )
    .unwrap();
    let ty = conf.clone();
    let ik = Stream::builder("ik")
        .input(p.clone())
        .output(q.clone())
        .effect(kin.atom([&p, &q]).unwrap())
        .generator(move |inputs| {
            let value = inputs[0].as_int().unwrap_or(0);
            vec![vec![ty.object(value * 10)]]
        })
        .build()
        .unwrap();
    let problem = Problem::builder()
        .goal(reached.fact([pos.object(5)]).unwrap())
        .action(go)
        .stream(ik)
        .build()
        .unwrap();
    (problem, pos, conf)
}

/// Reach pose 5 through a configuration both produced by an IK generator
/// and approved by a lazy test that rejects everything below 1000.
///
/// The generator counts up from 0, so every optimistic plan commits
/// another call without ever making the goal reachable.
pub fn picky_reach() -> Problem {
    let pos = Type::new("POS");
    let conf = Type::new("CONF");
    let kin = Predicate::new("Kin", [pos.clone(), conf.clone()]);
    let good = Predicate::new("Good", [conf.clone()]);
    let reached = Predicate::new("Reached", [pos.clone()]);
    let p = pos.param("P");
    let q = conf.param("Q");
    let go = Action::new(
        "go",
        vec![p.clone(), q.clone()],
        Formula::and([
            Formula::from(kin.atom([&p, &q]).unwrap()),
            Formula::from(good.atom([&q]).unwrap()),
        ]),
        reached.atom([&p]).unwrap(),
    )
    .unwrap();
    let ty = conf.clone();
    let ik = Stream::builder("ik")
        .input(p.clone())
        .output(q.clone())
        .effect(kin.atom([&p, &q]).unwrap())
        .generator(move |_| {
            let ty = ty.clone();
            (0i64..).map(move |n| vec![ty.object(n)])
        })
        .build()
        .unwrap();
    let approve = Stream::builder("approve")
        .input(q.clone())
        .effect(good.atom([&q]).unwrap())
        .test(|inputs| inputs[0].as_int().is_some_and(|n| n >= 1000))
        .build()
        .unwrap();
    Problem::builder()
        .goal(reached.fact([pos.object(5)]).unwrap())
        .action(go)
        .stream(ik)
        .stream(approve)
        .build()
        .unwrap()
}

/// Visit pose 1 after an eager test approves it.
///
/// With `flip`, the test alternates its answer on every call.
pub fn checked(flip: bool) -> Problem {
    let pos = Type::new("POS");
    let ok = Predicate::new("Ok", [pos.clone()]);
    let visited = Predicate::new("Visited", [pos.clone()]);
    let p = pos.param("P");
    let visit = Action::new(
        "visit",
        vec![p.clone()],
        ok.atom([&p]).unwrap(),
        visited.atom([&p]).unwrap(),
    )
    .unwrap();
    let toggle = Arc::new(AtomicBool::new(false));
    let check = Stream::builder("check")
        .input(p.clone())
        .effect(ok.atom([&p]).unwrap())
        .eager(true)
        .test(move |_| !flip || !toggle.fetch_xor(true, Ordering::SeqCst))
        .build()
        .unwrap();
    Problem::builder()
        .goal(visited.fact([pos.object(1)]).unwrap())
        .action(visit)
        .stream(check)
        .build()
        .unwrap()
}
