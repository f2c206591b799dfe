/*!

This is the long-form manual for `irv_counting` and the `rcvcount` program.

## Counting rules

`irv_counting` counts single-seat instant-runoff contests. In every round:

1. each ballot counts, with its weight, for its highest ranked candidate that
   has not been eliminated. Choices that do not name a candidate of the
   contest are skipped in the same way. A ballot left without any such
   choice is exhausted and counts for nobody;
2. if a candidate has at least `total / 2 + 1` votes (rounded down division),
   this candidate is elected and the count stops;
3. otherwise the candidate with the fewest votes is eliminated and a new
   round starts. If several candidates share the fewest votes, the count
   stops and reports the tie. No tiebreak is attempted.

With no vote at all, the threshold is 1 and nobody can be elected: a contest
with several candidates ends on a tie between all of them, a contest with a
single candidate ends without a winner.

The ballots are read again from their source in every round. They can live in
a file or in a temporary store that moves to disk when it grows, so large
elections do not need to fit in memory.

## Input formats

### `internal`

One ballot per line: the weight, followed by the candidate numbers in order
of preference. Candidate numbers start at 1 and follow the order of the
candidates in the contest configuration.

```text
3 2 1 4
1 1
2 3 2
```

### `blt`

The format used by many STV programs:

```text
4 1
-2
3 1 3 4 0
4 1 3 2 0
2 4 1 3 0
0
"Alice"
"Bob"
"Chris"
"Don"
"Mayor"
```

The first line has the number of candidates and the number of seats. Lines
with negative numbers list withdrawn candidates: their choices are removed
from the ballots. Each ballot line starts with a weight and ends with `0`.
A single `0` ends the ballots, and the quoted candidate names and the title
of the contest follow. Only single-seat contests are counted.

## Configuration

`rcvcount` accepts a contest configuration in JSON:

```text
{
  "contestName": "Mayor",
  "contestId": 1,
  "candidates": ["Alice", "Bob", "Chris"],
  "seatCount": 1,
  "ballotSource": {"provider": "internal", "filePath": "ballots.txt"},
  "notes": []
}
```

`filePath` is relative to the configuration file. `contestId`, `seatCount`
and `notes` are optional.

## Normalization

With `--normalize`, the ballots are first sorted by their list of choices and
the ballots with the same choices are merged into one, with the sum of their
weights. This does not change the outcome and it usually makes the following
rounds much faster.

 */
