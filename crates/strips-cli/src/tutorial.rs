//! One-dimensional block rearrangement.
//!
//! Blocks sit at integer poses on a line and a single gripper moves
//! between integer configurations. Block `i` starts at pose `i` and must
//! end at pose `i + 1`. Poses come from an unbounded generator, grasp
//! configurations from an inverse kinematics generator, and pose pairs
//! are checked for collisions by an eager test.

use strips_core::{
    Action, Axiom, DisplayMap, Formula, Object, Plan, Predicate, Problem, Result, Stream, Term,
    Type, Value,
};

/// Upper end of the pose generator's range.
const MAX_POSES: i64 = 10_000_000_000;

/// Knobs for building the tutorial problem.
#[derive(Debug, Clone, Copy)]
pub struct TutorialOptions {
    pub blocks: usize,
    /// When false the IK generator yields nothing and no plan exists.
    pub kinematics: bool,
}

impl Default for TutorialOptions {
    fn default() -> Self {
        Self {
            blocks: 3,
            kinematics: true,
        }
    }
}

/// Build the block rearrangement problem.
pub fn create_problem(options: TutorialOptions) -> Result<Problem> {
    let conf = Type::new("CONF");
    let block = Type::new("BLOCK");
    let pose = Type::new("POSE");

    // Fluents
    let at_conf = Predicate::new("AtConf", [conf.clone()]);
    let at_pose = Predicate::new("AtPose", [block.clone(), pose.clone()]);
    let hand_empty = Predicate::new("HandEmpty", Vec::<Type>::new());
    let holding = Predicate::new("Holding", [block.clone()]);

    // Derived
    let safe = Predicate::new("Safe", [block.clone(), block.clone(), pose.clone()]);

    // Static
    let legal_kin = Predicate::new("LegalKin", [pose.clone(), conf.clone()]);
    let collision_free = Predicate::new(
        "CollisionFree",
        [block.clone(), pose.clone(), block.clone(), pose.clone()],
    );

    let b1 = block.param("B1");
    let b2 = block.param("B2");
    let p1 = pose.param("P1");
    let p2 = pose.param("P2");
    let q1 = conf.param("Q1");
    let q2 = conf.param("Q2");
    let empty = || hand_empty.atom(Vec::<Term>::new());

    let pick = Action::new(
        "pick",
        [b1.clone(), p1.clone(), q1.clone()],
        Formula::and([
            Formula::from(at_pose.atom([&b1, &p1])?),
            Formula::from(empty()?),
            Formula::from(at_conf.atom([&q1])?),
            Formula::from(legal_kin.atom([&p1, &q1])?),
        ]),
        Formula::and([
            Formula::from(holding.atom([&b1])?),
            Formula::not(at_pose.atom([&b1, &p1])?),
            Formula::not(empty()?),
        ]),
    )?;

    let place = Action::new(
        "place",
        [b1.clone(), p1.clone(), q1.clone()],
        Formula::and([
            Formula::from(holding.atom([&b1])?),
            Formula::from(at_conf.atom([&q1])?),
            Formula::from(legal_kin.atom([&p1, &q1])?),
            Formula::forall(
                [b2.clone()],
                Formula::or([
                    Formula::equal(&b1, &b2),
                    Formula::from(safe.atom([&b2, &b1, &p1])?),
                ]),
            ),
        ]),
        Formula::and([
            Formula::from(at_pose.atom([&b1, &p1])?),
            Formula::from(empty()?),
            Formula::not(holding.atom([&b1])?),
        ]),
    )?;

    let move_action = Action::new(
        "move",
        [q1.clone(), q2.clone()],
        at_conf.atom([&q1])?,
        Formula::and([
            Formula::from(at_conf.atom([&q2])?),
            Formula::not(at_conf.atom([&q1])?),
        ]),
    )?;

    // Safe(B2, B1, P1) holds when B2 rests somewhere clear of B1 at P1.
    let safe_axiom = Axiom::new(
        safe.atom([&b2, &b1, &p1])?,
        Formula::exists(
            [p2.clone()],
            Formula::and([
                Formula::from(at_pose.atom([&b2, &p2])?),
                Formula::from(collision_free.atom([&b1, &p1, &b2, &p2])?),
            ]),
        ),
    )?;

    let pose_ty = pose.clone();
    let poses = Stream::builder("sample-pose")
        .output(p1.clone())
        .generator(move |_| {
            let pose_ty = pose_ty.clone();
            (0..MAX_POSES).map(move |p| vec![pose_ty.object(p)])
        })
        .build()?;

    let conf_ty = conf.clone();
    let kinematics = options.kinematics;
    let inverse_kinematics = Stream::builder("inverse-kinematics")
        .input(p1.clone())
        .output(q1.clone())
        .effect(legal_kin.atom([&p1, &q1])?)
        .generator(move |inputs| {
            let grasp = inputs[0].as_int().filter(|_| kinematics);
            grasp.map(|p| vec![conf_ty.object(p)])
        })
        .build()?;

    let collision_check = Stream::builder("collision-free")
        .inputs([b1.clone(), p1.clone(), b2.clone(), p2.clone()])
        .effect(collision_free.atom([&b1, &p1, &b2, &p2])?)
        .eager(true)
        .test(|inputs| inputs[1] != inputs[3])
        .build()?;

    let mut builder = Problem::builder()
        .constant(conf.object(0))
        .initial(at_conf.fact([conf.object(0)])?)
        .initial(hand_empty.fact(Vec::<Object>::new())?)
        .action(pick)
        .action(place)
        .action(move_action)
        .axiom(safe_axiom)
        .stream(poses)
        .stream(inverse_kinematics)
        .stream(collision_check);

    for index in 0..options.blocks as i64 {
        let name = block.object(block_name(index));
        builder = builder
            .initial(at_pose.fact([name.clone(), pose.object(index)])?)
            .goal(at_pose.fact([name, pose.object(index + 1)])?);
    }

    builder.build()
}

fn block_name(index: i64) -> String {
    format!("block{}", index)
}

/// Readable names for the objects in a plan.
///
/// Integer poses and configurations are prefixed with their sort so a
/// step reads `pick(block2, pose2, conf2)`.
pub fn display_names(plan: &Plan) -> DisplayMap {
    plan.steps
        .iter()
        .flat_map(|step| step.args.iter())
        .filter_map(|object| match object.value {
            Value::Int(n) => Some((
                object.clone(),
                format!("{}{}", object.ty.name().to_lowercase(), n),
            )),
            _ => None,
        })
        .collect()
}
